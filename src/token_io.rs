use crate::assignment::Pick;
use crate::binding::{Binding, BindingCache};
use crate::eval::{evaluate_expr, evaluate_guard, evaluate_pattern_literal};
use crate::model::{Marking, PetriNet};
use crate::pattern::Pattern;
use crate::token::{Environment, Token};
use log::debug;
use std::collections::HashMap;

// --- Consumption ---

/// Removes the picked tokens from their places. Count-fallback picks
/// decrement the count (floored at zero); indexed picks are spliced out in
/// descending index order so earlier removals never shift later indices.
pub fn consume_tokens(picks: &[Pick], net: &mut PetriNet) {
    let mut by_place: HashMap<&str, Vec<&Pick>> = HashMap::new();
    for pick in picks {
        by_place.entry(pick.place_id.as_str()).or_default().push(pick);
    }

    for (place_id, picks) in by_place {
        let Some(place) = net.find_place_mut(place_id) else {
            continue;
        };
        let fallback = picks.iter().filter(|p| p.count_fallback).count() as u64;
        if fallback > 0 {
            if let Marking::Count(count) = &mut place.tokens {
                *count = count.saturating_sub(fallback);
            }
        }
        let mut indices: Vec<usize> = picks
            .iter()
            .filter(|p| !p.count_fallback)
            .map(|p| p.token_index)
            .collect();
        if indices.is_empty() {
            continue;
        }
        if let Marking::Values(values) = &mut place.tokens {
            indices.sort_unstable_by(|a, b| b.cmp(a));
            for index in indices {
                if index < values.len() {
                    values.remove(index);
                }
            }
        }
    }
}

// --- Production ---

/// Appends output tokens to each target place, evaluated against the
/// post-consumption environment. A binding whose evaluation fails is skipped;
/// the rest of the arc still produces.
pub fn produce_tokens(
    net: &mut PetriNet,
    transition_id: &str,
    cache: &BindingCache,
    env: &Environment,
) {
    let output_arcs: Vec<(String, String)> = net
        .output_arcs(transition_id)
        .into_iter()
        .map(|a| (a.id.clone(), a.target.clone()))
        .collect();

    for (arc_id, target_id) in output_arcs {
        let bindings = cache.arc_bindings(&arc_id).to_vec();
        let weight = net
            .arcs
            .iter()
            .find(|a| a.id == arc_id)
            .map(|a| a.effective_weight())
            .unwrap_or(0);
        let Some(place) = net.find_place_mut(&target_id) else {
            continue;
        };

        if !bindings.is_empty() {
            let values = place.tokens.values().cloned().unwrap_or_default();
            let mut values = values;
            for binding in &bindings {
                match produce_one(binding, env) {
                    Ok(Produced::One(token)) => values.push(token),
                    Ok(Produced::Spread(tokens)) => values.extend(tokens),
                    Err(err) => {
                        debug!("skipping output binding on arc {}: {}", arc_id, err);
                    }
                }
            }
            place.tokens = Marking::Values(values);
            continue;
        }

        // No bindings: weight-many anonymous tokens, one if unweighted.
        let count = weight.max(1);
        match &mut place.tokens {
            Marking::Count(n) => *n += count as u64,
            Marking::Values(values) => {
                let fallback = match env.first_value() {
                    Some(Token::Int(v)) => Token::Int(*v),
                    Some(Token::Bool(v)) => Token::Bool(*v),
                    _ => Token::Int(1),
                };
                for _ in 0..count {
                    values.push(fallback.clone());
                }
            }
        }
    }
}

enum Produced {
    One(Token),
    Spread(Vec<Token>),
}

/// Output dispatch: variables forward their bound token, computed
/// expressions push their result as a single token (a list result stays one
/// list token), and tuple/list pattern constructions spread element-wise.
fn produce_one(binding: &Binding, env: &Environment) -> Result<Produced, String> {
    match binding {
        Binding::Var { name, .. } => env
            .get(name)
            .cloned()
            .map(Produced::One)
            .ok_or_else(|| format!("unbound variable '{}'", name)),
        Binding::Arithmetic(expr) => evaluate_expr(expr, env)
            .map(Produced::One)
            .map_err(|e| e.to_string()),
        Binding::Boolean(ast) => evaluate_guard(ast, env)
            .map(|v| Produced::One(Token::Bool(v)))
            .map_err(|e| e.to_string()),
        Binding::Pattern(pattern) => {
            let token = evaluate_pattern_literal(pattern, env).map_err(|e| e.to_string())?;
            match (pattern, token) {
                (Pattern::Tuple(_) | Pattern::List(_), Token::List(items)) => {
                    Ok(Produced::Spread(items))
                }
                (_, token) => Ok(Produced::One(token)),
            }
        }
    }
}
