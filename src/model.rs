use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// --- Core Petri Net Structure ---

/// Net description exchanged with the surrounding editor. Arc direction is
/// derived from id-set membership: an arc whose source is a place id is an
/// input arc of its target transition, and vice versa.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PetriNet {
    pub places: Vec<Place>,
    pub transitions: Vec<Transition>,
    pub arcs: Vec<NetArc>,
}

// --- Components ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// The marking: either an explicit ordered token list or a bare count
    /// (the count-fallback form for places that never held typed tokens).
    #[serde(default)]
    pub tokens: Marking,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Boolean guard expression text, or empty/absent for no guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    /// Advisory assignment list like "y = x + 1, z = x - 1". Evaluated on
    /// fire for diagnostics only; it never mutates the marking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetArc {
    pub id: String,
    pub source: String, // ID of source node (Place or Transition)
    pub target: String, // ID of target node (Place or Transition)
    /// Used when no explicit bindings are present: each unit of weight
    /// consumes/produces one anonymous token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    /// Binding expression strings, classified at cache-build time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<String>,
}

/// A place's marking. `Count` is the weight-only fallback form; `Values` is
/// the ordered token sequence whose length is the place's token count.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Marking {
    Count(u64),
    Values(Vec<Token>),
}

impl Default for Marking {
    fn default() -> Marking {
        Marking::Count(0)
    }
}

impl Marking {
    pub fn count(&self) -> u64 {
        match self {
            Marking::Count(n) => *n,
            Marking::Values(tokens) => tokens.len() as u64,
        }
    }

    pub fn values(&self) -> Option<&Vec<Token>> {
        match self {
            Marking::Values(tokens) => Some(tokens),
            Marking::Count(_) => None,
        }
    }

    pub fn is_count_only(&self) -> bool {
        matches!(self, Marking::Count(_))
    }
}

impl NetArc {
    /// Effective weight for arcs without bindings. Zero or absent means the
    /// arc imposes no token requirement at all.
    pub fn effective_weight(&self) -> usize {
        match self.weight {
            Some(w) if w > 0 => w as usize,
            _ => 0,
        }
    }
}

// --- Validation ---

#[derive(Debug, Error)]
pub enum NetError {
    #[error("duplicate node id '{0}'")]
    DuplicateId(String),
    #[error("{kind} has an empty id")]
    EmptyId { kind: &'static str },
    #[error("arc '{arc}' references unknown node '{node}'")]
    DanglingArc { arc: String, node: String },
    #[error("arc '{arc}' connects two {kind}s")]
    SameKindArc { arc: String, kind: &'static str },
    #[error("arc '{arc}' has negative weight {weight}")]
    NegativeWeight { arc: String, weight: i64 },
}

impl PetriNet {
    /// Fails fast on structural problems before any simulation attempt.
    pub fn validate(&self) -> Result<(), NetError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for place in &self.places {
            if place.id.is_empty() {
                return Err(NetError::EmptyId { kind: "place" });
            }
            if !seen.insert(&place.id) {
                return Err(NetError::DuplicateId(place.id.clone()));
            }
        }
        for transition in &self.transitions {
            if transition.id.is_empty() {
                return Err(NetError::EmptyId { kind: "transition" });
            }
            if !seen.insert(&transition.id) {
                return Err(NetError::DuplicateId(transition.id.clone()));
            }
        }

        let place_ids: HashSet<&str> = self.places.iter().map(|p| p.id.as_str()).collect();
        let transition_ids: HashSet<&str> =
            self.transitions.iter().map(|t| t.id.as_str()).collect();

        for arc in &self.arcs {
            if arc.id.is_empty() {
                return Err(NetError::EmptyId { kind: "arc" });
            }
            if let Some(w) = arc.weight {
                if w < 0 {
                    return Err(NetError::NegativeWeight {
                        arc: arc.id.clone(),
                        weight: w,
                    });
                }
            }
            for node in [&arc.source, &arc.target] {
                if !place_ids.contains(node.as_str()) && !transition_ids.contains(node.as_str()) {
                    return Err(NetError::DanglingArc {
                        arc: arc.id.clone(),
                        node: node.clone(),
                    });
                }
            }
            if place_ids.contains(arc.source.as_str()) && place_ids.contains(arc.target.as_str()) {
                return Err(NetError::SameKindArc {
                    arc: arc.id.clone(),
                    kind: "place",
                });
            }
            if transition_ids.contains(arc.source.as_str())
                && transition_ids.contains(arc.target.as_str())
            {
                return Err(NetError::SameKindArc {
                    arc: arc.id.clone(),
                    kind: "transition",
                });
            }
        }
        Ok(())
    }

    pub fn find_place(&self, id: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.id == id)
    }

    pub fn find_place_mut(&mut self, id: &str) -> Option<&mut Place> {
        self.places.iter_mut().find(|p| p.id == id)
    }

    pub fn find_transition(&self, id: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.id == id)
    }

    /// Input arcs (place -> transition) of a transition, in arc-list order.
    pub fn input_arcs(&self, transition_id: &str) -> Vec<&NetArc> {
        let place_ids: HashSet<&str> = self.places.iter().map(|p| p.id.as_str()).collect();
        self.arcs
            .iter()
            .filter(|a| a.target == transition_id && place_ids.contains(a.source.as_str()))
            .collect()
    }

    /// Output arcs (transition -> place) of a transition, in arc-list order.
    pub fn output_arcs(&self, transition_id: &str) -> Vec<&NetArc> {
        let place_ids: HashSet<&str> = self.places.iter().map(|p| p.id.as_str()).collect();
        self.arcs
            .iter()
            .filter(|a| a.source == transition_id && place_ids.contains(a.target.as_str()))
            .collect()
    }
}

// --- Events ---

/// Notifications emitted to the surrounding editor. Delivered through an
/// explicit callback handed to the simulator; there is no global bus.
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    TransitionsChanged {
        enabled: Vec<String>,
        previously_enabled: Vec<String>,
        has_enabled: bool,
    },
    TransitionFired {
        transition_id: String,
        new_net: PetriNet,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_net() -> PetriNet {
        serde_json::from_str(
            r#"{
                "places": [
                    {"id": "p1", "label": "P1", "tokens": [2, 5]},
                    {"id": "p2", "label": "P2", "tokens": 3}
                ],
                "transitions": [{"id": "t1", "label": "T1", "guard": "x >= 2"}],
                "arcs": [
                    {"id": "a1", "source": "p1", "target": "t1", "bindings": ["x"]},
                    {"id": "a2", "source": "t1", "target": "p2", "weight": 1}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_both_marking_forms() {
        let net = sample_net();
        assert_eq!(net.places[0].tokens.values().map(|v| v.len()), Some(2));
        assert!(net.places[1].tokens.is_count_only());
        assert_eq!(net.places[1].tokens.count(), 3);
        net.validate().unwrap();
    }

    #[test]
    fn classifies_arc_direction_by_membership() {
        let net = sample_net();
        let inputs = net.input_arcs("t1");
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id, "a1");
        let outputs = net.output_arcs("t1");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].id, "a2");
    }

    #[test]
    fn validation_rejects_dangling_arcs() {
        let mut net = sample_net();
        net.arcs[0].source = "nope".to_string();
        assert!(matches!(net.validate(), Err(NetError::DanglingArc { .. })));
    }

    #[test]
    fn validation_rejects_duplicate_ids() {
        let mut net = sample_net();
        net.places.push(net.places[0].clone());
        assert!(matches!(net.validate(), Err(NetError::DuplicateId(_))));
    }

    #[test]
    fn validation_rejects_negative_weight() {
        let mut net = sample_net();
        net.arcs[1].weight = Some(-2);
        assert!(matches!(
            net.validate(),
            Err(NetError::NegativeWeight { .. })
        ));
    }
}
