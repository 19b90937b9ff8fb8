use crate::binding::{Binding, BindingCache};
use crate::eval::{evaluate_expr, evaluate_guard};
use crate::guard::BoolExpr;
use crate::model::{NetArc, PetriNet, Place, Transition};
use crate::oracle::SatOracle;
use crate::pattern::match_pattern;
use crate::token::{Environment, Token};
use log::trace;

// --- Picks ---

/// One input token selected for consumption. `count_fallback` marks tokens
/// materialized from a count-only marking, which are removed by decrementing
/// the count instead of splicing an index.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub arc_id: String,
    pub place_id: String,
    pub token_index: usize,
    pub value: Token,
    pub count_fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub env: Environment,
    pub picks: Vec<Pick>,
}

/// Materializes the candidate tokens of a place. Count-only markings yield
/// anonymous `1` tokens; both forms are capped to keep the search bounded on
/// heavily-marked places.
pub fn tokens_for_place(place: &Place, max_tokens: usize) -> (Vec<Token>, bool) {
    match place.tokens.values() {
        Some(values) => (values.iter().take(max_tokens).cloned().collect(), false),
        None => {
            let count = (place.tokens.count() as usize).min(max_tokens);
            (vec![Token::Int(1); count], true)
        }
    }
}

// --- Unbound-Variable Pre-Check ---

/// True when the guard or an output binding reads a variable that no input
/// binding can supply. Such a transition is reported disabled without
/// attempting the search.
pub fn has_unbound_variables(
    net: &PetriNet,
    cache: &BindingCache,
    transition_id: &str,
    input_arcs: &[&NetArc],
) -> bool {
    let mut bound: Vec<String> = Vec::new();
    for arc in input_arcs {
        for binding in cache.arc_bindings(&arc.id) {
            bound.extend(binding.bound_variables());
        }
    }

    if let Some(guard) = cache.guards.get(transition_id) {
        let mut guard_vars = Vec::new();
        guard.collect_variables(&mut guard_vars);
        if guard_vars.iter().any(|v| !bound.contains(v)) {
            return true;
        }
    }

    for arc in net.output_arcs(transition_id) {
        for binding in cache.arc_bindings(&arc.id) {
            if let Binding::Var { name, .. } = binding {
                if !bound.contains(name) {
                    return true;
                }
            }
        }
    }
    false
}

// --- Backtracking Search ---

enum Outcome {
    Found(Environment),
    /// A complete token binding was found but the guard rejected it. The
    /// search stops here instead of hunting for another guard-satisfying
    /// assignment.
    GuardRejected,
    Exhausted,
}

struct Search<'a> {
    input_arcs: &'a [&'a NetArc],
    net: &'a PetriNet,
    cache: &'a BindingCache,
    guard: Option<&'a BoolExpr>,
    oracle: Option<&'a dyn SatOracle>,
    max_tokens_per_place: usize,
    picks: Vec<Pick>,
}

/// Depth-first search for a token assignment satisfying every input arc and
/// the guard. Returns `None` when the transition is not enabled.
pub fn find_satisfying_assignment(
    net: &PetriNet,
    transition: &Transition,
    input_arcs: &[&NetArc],
    cache: &BindingCache,
    oracle: Option<&dyn SatOracle>,
    max_tokens_per_place: usize,
) -> Option<Assignment> {
    let mut search = Search {
        input_arcs,
        net,
        cache,
        guard: cache.guards.get(&transition.id),
        oracle,
        max_tokens_per_place,
        picks: Vec::new(),
    };
    match search.try_arc(0, Environment::new()) {
        Outcome::Found(env) => Some(Assignment {
            env,
            picks: search.picks,
        }),
        Outcome::GuardRejected | Outcome::Exhausted => None,
    }
}

impl Search<'_> {
    fn try_arc(&mut self, arc_index: usize, env: Environment) -> Outcome {
        if arc_index >= self.input_arcs.len() {
            return self.check_guard(env);
        }

        let arc = self.input_arcs[arc_index];
        let Some(place) = self.net.find_place(&arc.source) else {
            return Outcome::Exhausted;
        };
        let (tokens, count_fallback) = tokens_for_place(place, self.max_tokens_per_place);
        let bindings = self.cache.arc_bindings(&arc.id);
        let needed = if bindings.is_empty() {
            arc.effective_weight()
        } else {
            bindings.len()
        };
        if needed == 0 {
            return self.try_arc(arc_index + 1, env);
        }
        if tokens.len() < needed {
            return Outcome::Exhausted;
        }

        let mut used = vec![false; tokens.len()];
        self.try_slot(arc_index, 0, needed, &tokens, count_fallback, &mut used, env)
    }

    #[allow(clippy::too_many_arguments)]
    fn try_slot(
        &mut self,
        arc_index: usize,
        slot: usize,
        needed: usize,
        tokens: &[Token],
        count_fallback: bool,
        used: &mut [bool],
        env: Environment,
    ) -> Outcome {
        if slot >= needed {
            return self.try_arc(arc_index + 1, env);
        }
        let arc = self.input_arcs[arc_index];
        let binding = self.cache.arc_bindings(&arc.id).get(slot).cloned();

        for i in 0..tokens.len() {
            if used[i] {
                continue;
            }
            let Some(next_env) = accept(binding.as_ref(), &tokens[i], &env) else {
                continue;
            };
            used[i] = true;
            self.picks.push(Pick {
                arc_id: arc.id.clone(),
                place_id: arc.source.clone(),
                token_index: i,
                value: tokens[i].clone(),
                count_fallback,
            });
            match self.try_slot(arc_index, slot + 1, needed, tokens, count_fallback, used, next_env)
            {
                Outcome::Exhausted => {
                    self.picks.pop();
                    used[i] = false;
                }
                done => return done,
            }
        }
        Outcome::Exhausted
    }

    fn check_guard(&self, env: Environment) -> Outcome {
        let Some(guard) = self.guard else {
            return Outcome::Found(env);
        };
        let satisfied = match evaluate_guard(guard, &env) {
            Ok(v) => v,
            // Direct evaluation could not decide; ask the oracle and fail
            // closed on oracle trouble.
            Err(err) => {
                trace!("guard fell back to oracle: {}", err);
                match self.oracle {
                    Some(oracle) => oracle.evaluate_guard(guard, &env).unwrap_or(false),
                    None => false,
                }
            }
        };
        if satisfied {
            Outcome::Found(env)
        } else {
            Outcome::GuardRejected
        }
    }
}

/// Decides whether `token` can fill a binding slot under the current partial
/// environment, returning the extended environment on success. A `None`
/// binding is a weight-fallback slot and accepts anything.
fn accept(binding: Option<&Binding>, token: &Token, env: &Environment) -> Option<Environment> {
    let Some(binding) = binding else {
        return Some(env.clone());
    };
    match binding {
        Binding::Var { name, var_type } => {
            if let Some(ty) = var_type {
                if token.token_type() != *ty {
                    return None;
                }
            }
            let mut next = env.clone();
            next.bind(name, token.clone()).then_some(next)
        }
        Binding::Pattern(pattern) => {
            let mut next = env.clone();
            match_pattern(pattern, token, &mut next).then_some(next)
        }
        Binding::Arithmetic(expr) => {
            // Evaluation errors (unbound vars at this point in the search)
            // simply fail the candidate.
            let value = evaluate_expr(expr, env).ok()?;
            let matches = match (&value, token) {
                (Token::Int(a), Token::Int(b)) => a == b,
                (Token::Pair { .. }, Token::Pair { .. }) => value == *token,
                _ => false,
            };
            matches.then(|| env.clone())
        }
        Binding::Boolean(ast) => {
            let value = evaluate_guard(ast, env).ok()?;
            (token.as_bool() == Some(value)).then(|| env.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleError, SatOracle};

    fn net_from(json: &str) -> PetriNet {
        serde_json::from_str(json).unwrap()
    }

    fn find(net: &PetriNet, transition_id: &str) -> Option<Assignment> {
        let cache = BindingCache::build(net);
        let transition = net.find_transition(transition_id).unwrap();
        let input_arcs = net.input_arcs(transition_id);
        find_satisfying_assignment(net, transition, &input_arcs, &cache, None, 20)
    }

    #[test]
    fn guard_rejection_stops_the_search() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [1, 5]}],
                "transitions": [{"id": "t1", "guard": "x >= 2"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
            }"#,
        );
        // x binds to 1 (first token in place order), guard 1 >= 2 fails,
        // and no alternative is explored.
        assert!(find(&net, "t1").is_none());
    }

    #[test]
    fn enabled_when_first_token_satisfies() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [2, 5]}],
                "transitions": [{"id": "t1", "guard": "x >= 2"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
            }"#,
        );
        let assignment = find(&net, "t1").unwrap();
        assert_eq!(assignment.env.get("x"), Some(&Token::Int(2)));
        assert_eq!(assignment.picks.len(), 1);
        assert_eq!(assignment.picks[0].token_index, 0);
    }

    #[test]
    fn pattern_binding_skips_non_matching_tokens() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [
                    {"__pair__": true, "fst": true, "snd": 9},
                    {"__pair__": true, "fst": false, "snd": 4}
                ]}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["(F, x:Int)"]}]
            }"#,
        );
        let assignment = find(&net, "t1").unwrap();
        assert_eq!(assignment.env.get("x"), Some(&Token::Int(4)));
        assert_eq!(assignment.picks[0].token_index, 1);
    }

    #[test]
    fn two_slots_share_one_place_linearly() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [3, 3]}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x", "x"]}]
            }"#,
        );
        // Both slots need the same value and each consumes its own token.
        let assignment = find(&net, "t1").unwrap();
        assert_eq!(assignment.picks.len(), 2);
        assert_ne!(
            assignment.picks[0].token_index,
            assignment.picks[1].token_index
        );
    }

    #[test]
    fn arithmetic_binding_requires_computed_token() {
        let net = net_from(
            r#"{
                "places": [
                    {"id": "p1", "tokens": [3]},
                    {"id": "p2", "tokens": [4, 5]}
                ],
                "transitions": [{"id": "t1"}],
                "arcs": [
                    {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                    {"id": "a2", "source": "p2", "target": "t1", "bindings": ["x + 1"]}
                ]
            }"#,
        );
        let assignment = find(&net, "t1").unwrap();
        assert_eq!(assignment.env.get("x"), Some(&Token::Int(3)));
        assert_eq!(assignment.picks[1].value, Token::Int(4));
    }

    #[test]
    fn weight_fallback_and_count_only_places() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": 3}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "weight": 2}]
            }"#,
        );
        let assignment = find(&net, "t1").unwrap();
        assert_eq!(assignment.picks.len(), 2);
        assert!(assignment.picks.iter().all(|p| p.count_fallback));
        assert!(assignment.env.is_empty());
    }

    #[test]
    fn under_supplied_arc_disables() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [1]}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x", "y"]}]
            }"#,
        );
        assert!(find(&net, "t1").is_none());
    }

    #[test]
    fn no_input_arcs_is_vacuously_enabled() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": []}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "t1", "target": "p1", "weight": 1}]
            }"#,
        );
        let assignment = find(&net, "t1").unwrap();
        assert!(assignment.picks.is_empty());
    }

    #[test]
    fn unbound_guard_variable_pre_check() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [1]}],
                "transitions": [{"id": "t1", "guard": "y > 0"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
            }"#,
        );
        let cache = BindingCache::build(&net);
        let input_arcs = net.input_arcs("t1");
        assert!(has_unbound_variables(&net, &cache, "t1", &input_arcs));
    }

    #[test]
    fn unbound_output_variable_pre_check() {
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": [1]}, {"id": "p2", "tokens": []}],
                "transitions": [{"id": "t1"}],
                "arcs": [
                    {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                    {"id": "a2", "source": "t1", "target": "p2", "bindings": ["z"]}
                ]
            }"#,
        );
        let cache = BindingCache::build(&net);
        let input_arcs = net.input_arcs("t1");
        assert!(has_unbound_variables(&net, &cache, "t1", &input_arcs));
    }

    struct AlwaysTrue;
    impl SatOracle for AlwaysTrue {
        fn evaluate_guard(
            &self,
            _guard: &BoolExpr,
            _env: &Environment,
        ) -> Result<bool, OracleError> {
            Ok(true)
        }
    }

    #[test]
    fn oracle_decides_guards_direct_evaluation_cannot() {
        // Comparing a string with an int raises during direct evaluation.
        let net = net_from(
            r#"{
                "places": [{"id": "p1", "tokens": ["abc"]}],
                "transitions": [{"id": "t1", "guard": "x > 0"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
            }"#,
        );
        let cache = BindingCache::build(&net);
        let transition = net.find_transition("t1").unwrap();
        let input_arcs = net.input_arcs("t1");

        // Fail-closed without an oracle.
        assert!(
            find_satisfying_assignment(&net, transition, &input_arcs, &cache, None, 20).is_none()
        );
        let oracle = AlwaysTrue;
        assert!(find_satisfying_assignment(
            &net,
            transition,
            &input_arcs,
            &cache,
            Some(&oracle),
            20
        )
        .is_some());
    }
}
