use crate::expr::{is_ident_part, parse_arithmetic, Expr, ALLOWED_FUNCTIONS};
use crate::guard::{parse_guard, BoolExpr};
use crate::model::PetriNet;
use crate::pattern::{extract_variables, parse_pattern, Pattern};
use crate::token::TokenType;
use log::warn;
use std::collections::HashMap;

// --- Binding Classification ---

/// A classified arc inscription. The kind decides how the binding accepts
/// tokens during assignment search and how it constructs tokens on output.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Bare variable, possibly type-annotated: `x`, `x:Int`, `b:bool`.
    Var {
        name: String,
        var_type: Option<TokenType>,
    },
    /// Structural pattern such as `(F, x:Int)` or `[a, b]`.
    Pattern(Pattern),
    /// Computed expression such as `x + 1` or `concat(s, 'a')`.
    Arithmetic(Expr),
    /// Boolean expression such as `T` handled at guard level, or `x > 2`.
    Boolean(BoolExpr),
}

impl Binding {
    /// Variable names this binding can supply to the environment. Computed
    /// bindings supply nothing; they only consume already-bound names.
    pub fn bound_variables(&self) -> Vec<String> {
        match self {
            Binding::Var { name, .. } => vec![name.clone()],
            Binding::Pattern(pattern) => extract_variables(pattern),
            Binding::Arithmetic(_) | Binding::Boolean(_) => Vec::new(),
        }
    }
}

fn has_allowed_call_text(text: &str) -> bool {
    ALLOWED_FUNCTIONS.iter().any(|name| {
        text.match_indices(name).any(|(idx, _)| {
            let before_ok = idx == 0
                || text[..idx]
                    .chars()
                    .next_back()
                    .is_none_or(|c| !is_ident_part(c));
            let rest = &text[idx + name.len()..];
            before_ok && rest.trim_start().starts_with('(')
        })
    })
}

fn classify_arithmetic(text: &str) -> Option<Binding> {
    let ast = parse_arithmetic(text).ok()?;
    if ast.has_disallowed_call() {
        return None;
    }
    // A bare annotated variable dispatches on its type, not as a computed
    // expression.
    if let Expr::Var { name, var_type } = &ast {
        return Some(Binding::Var {
            name: name.clone(),
            var_type: *var_type,
        });
    }
    Some(Binding::Arithmetic(ast))
}

fn classify_pattern(text: &str) -> Option<Binding> {
    let pattern = parse_pattern(text).ok()?;
    if let Pattern::Var { name, var_type } = &pattern {
        return Some(Binding::Var {
            name: name.clone(),
            var_type: *var_type,
        });
    }
    Some(Binding::Pattern(pattern))
}

fn classify_boolean(text: &str) -> Option<Binding> {
    let ast = parse_guard(text).ok()?;
    if let BoolExpr::Var { name, var_type } = &ast {
        return Some(Binding::Var {
            name: name.clone(),
            var_type: *var_type,
        });
    }
    Some(Binding::Boolean(ast))
}

/// Classifies one binding string. Texts calling an allow-listed function are
/// tried as arithmetic first so `fst(p)` never half-parses as a pattern;
/// everything else prefers pattern parsing, then arithmetic, then boolean.
pub fn classify_binding(text: &str) -> Option<Binding> {
    if has_allowed_call_text(text) {
        classify_arithmetic(text)
            .or_else(|| classify_pattern(text))
            .or_else(|| classify_boolean(text))
    } else {
        classify_pattern(text)
            .or_else(|| classify_arithmetic(text))
            .or_else(|| classify_boolean(text))
    }
}

// --- Caches ---

/// Parsed guard and binding ASTs keyed by transition/arc id, rebuilt only
/// when the net's inscription text changes.
#[derive(Debug, Default, Clone)]
pub struct BindingCache {
    pub guards: HashMap<String, BoolExpr>,
    pub bindings: HashMap<String, Vec<Binding>>,
    signature: String,
}

impl BindingCache {
    pub fn build(net: &PetriNet) -> BindingCache {
        let mut guards = HashMap::new();
        for transition in &net.transitions {
            let Some(guard_text) = transition.guard.as_deref() else {
                continue;
            };
            if guard_text.trim().is_empty() {
                continue;
            }
            match parse_guard(guard_text) {
                Ok(ast) => {
                    guards.insert(transition.id.clone(), ast);
                }
                // An unparsable guard keeps its transition disabled; the
                // editor surfaces the parse error at edit time.
                Err(err) => warn!(
                    "guard '{}' on transition {} does not parse: {}",
                    guard_text, transition.id, err
                ),
            }
        }

        let mut bindings = HashMap::new();
        for arc in &net.arcs {
            let mut classified = Vec::new();
            for text in &arc.bindings {
                match classify_binding(text) {
                    Some(binding) => classified.push(binding),
                    None => warn!("dropping unclassifiable binding '{}' on arc {}", text, arc.id),
                }
            }
            if !classified.is_empty() {
                bindings.insert(arc.id.clone(), classified);
            }
        }

        BindingCache {
            guards,
            bindings,
            signature: compute_cache_signature(net),
        }
    }

    /// Rebuilds when the inscription signature changed. Returns true when a
    /// rebuild happened.
    pub fn rebuild_if_changed(&mut self, net: &PetriNet) -> bool {
        let signature = compute_cache_signature(net);
        if signature == self.signature {
            return false;
        }
        *self = BindingCache::build(net);
        true
    }

    pub fn arc_bindings(&self, arc_id: &str) -> &[Binding] {
        self.bindings.get(arc_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Cheap change detector over all guard/action/binding text. A plain string
/// compare decides cache staleness; no structural diffing.
pub fn compute_cache_signature(net: &PetriNet) -> String {
    let mut transitions: Vec<_> = net.transitions.iter().collect();
    transitions.sort_by(|a, b| a.id.cmp(&b.id));
    let t_sig = transitions
        .iter()
        .map(|t| {
            format!(
                "{}|g:{}|a:{}",
                t.id,
                t.guard.as_deref().unwrap_or(""),
                t.action.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join(";");

    let mut arcs: Vec<_> = net.arcs.iter().collect();
    arcs.sort_by(|a, b| a.id.cmp(&b.id));
    let a_sig = arcs
        .iter()
        .map(|a| format!("{}|b:{}", a.id, a.bindings.join(",")))
        .collect::<Vec<_>>()
        .join(";");

    format!("{}||{}", t_sig, a_sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_typed_variables_classify_as_var() {
        assert_eq!(
            classify_binding("x"),
            Some(Binding::Var {
                name: "x".into(),
                var_type: None
            })
        );
        assert_eq!(
            classify_binding("b:bool"),
            Some(Binding::Var {
                name: "b".into(),
                var_type: Some(TokenType::Bool)
            })
        );
        assert_eq!(
            classify_binding("p:Pair"),
            Some(Binding::Var {
                name: "p".into(),
                var_type: Some(TokenType::Pair)
            })
        );
    }

    #[test]
    fn structured_texts_classify_as_patterns() {
        assert!(matches!(
            classify_binding("(F, x:Int)"),
            Some(Binding::Pattern(Pattern::Pair(..)))
        ));
        assert!(matches!(
            classify_binding("T"),
            Some(Binding::Pattern(Pattern::Bool(true)))
        ));
        assert!(matches!(
            classify_binding("[a, b]"),
            Some(Binding::Pattern(Pattern::List(_)))
        ));
    }

    #[test]
    fn allow_listed_calls_classify_as_arithmetic() {
        assert!(matches!(
            classify_binding("fst(p)"),
            Some(Binding::Arithmetic(Expr::Call { .. }))
        ));
        assert!(matches!(
            classify_binding("x + 1"),
            Some(Binding::Arithmetic(Expr::BinOp { .. }))
        ));
    }

    #[test]
    fn disallowed_calls_are_rejected() {
        assert_eq!(classify_binding("mystery(x)"), None);
        assert_eq!(classify_binding("x + mystery(1)"), None);
    }

    #[test]
    fn comparison_text_classifies_as_boolean() {
        assert!(matches!(
            classify_binding("x > 2"),
            Some(Binding::Boolean(BoolExpr::Cmp { .. }))
        ));
    }

    #[test]
    fn cache_rebuilds_only_on_text_change() {
        let mut net: PetriNet = serde_json::from_str(
            r#"{
                "places": [{"id": "p1", "tokens": [1]}],
                "transitions": [{"id": "t1", "guard": "x >= 2"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]}]
            }"#,
        )
        .unwrap();
        let mut cache = BindingCache::build(&net);
        assert!(cache.guards.contains_key("t1"));
        assert_eq!(cache.arc_bindings("a1").len(), 1);

        assert!(!cache.rebuild_if_changed(&net));
        net.transitions[0].guard = Some("x >= 3".into());
        assert!(cache.rebuild_if_changed(&net));

        // Marking changes alone never invalidate.
        net.places[0].tokens = crate::model::Marking::Count(7);
        assert!(!cache.rebuild_if_changed(&net));
    }

    #[test]
    fn unparsable_bindings_are_dropped() {
        let net: PetriNet = serde_json::from_str(
            r#"{
                "places": [{"id": "p1", "tokens": [1]}],
                "transitions": [{"id": "t1"}],
                "arcs": [{"id": "a1", "source": "p1", "target": "t1",
                          "bindings": ["x", "@@@"]}]
            }"#,
        )
        .unwrap();
        let cache = BindingCache::build(&net);
        assert_eq!(cache.arc_bindings("a1").len(), 1);
    }
}
