use crate::model::PetriNet;
use itertools::Itertools;
use std::collections::HashMap;

/// Token categories a transition demands from a place. Integer-like and
/// boolean-like demands on the same place do not compete with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Categories {
    int: bool,
    boolean: bool,
}

impl Categories {
    fn overlaps(&self, other: &Categories) -> bool {
        (self.int && other.int) || (self.boolean && other.boolean)
    }
}

/// Sniffs the demanded category from raw binding text. `T`/`F` literals and
/// `:bool`/`:boolean` annotations demand booleans, everything else ints.
fn binding_category(text: &str) -> Categories {
    let trimmed = text.trim();
    if trimmed == "T" || trimmed == "F" {
        return Categories {
            int: false,
            boolean: true,
        };
    }
    let mut rest = text;
    while let Some(idx) = rest.find(':') {
        let after = rest[idx + 1..].trim_start_matches(' ');
        if after.len() >= 4 && after.as_bytes()[..4].eq_ignore_ascii_case(b"bool") {
            return Categories {
                int: false,
                boolean: true,
            };
        }
        rest = &rest[idx + 1..];
    }
    Categories {
        int: true,
        boolean: false,
    }
}

/// Pairwise conflict detection with per-resolution memoization. Two
/// transitions conflict iff they demand the same token category from a
/// shared input place.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    cache: HashMap<(String, String), bool>,
}

impl ConflictResolver {
    pub fn new() -> ConflictResolver {
        ConflictResolver::default()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn cache_key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn in_conflict(&mut self, transition1: &str, transition2: &str, net: &PetriNet) -> bool {
        let key = Self::cache_key(transition1, transition2);
        if let Some(&cached) = self.cache.get(&key) {
            return cached;
        }
        let needs1 = required_categories(transition1, net);
        let needs2 = required_categories(transition2, net);
        let conflict = needs1.iter().any(|(place_id, cats1)| {
            needs2
                .get(place_id)
                .is_some_and(|cats2| cats1.overlaps(cats2))
        });
        self.cache.insert(key, conflict);
        conflict
    }

    pub fn is_non_conflicting_set(&mut self, transitions: &[&str], net: &PetriNet) -> bool {
        for i in 0..transitions.len() {
            for j in i + 1..transitions.len() {
                if self.in_conflict(transitions[i], transitions[j], net) {
                    return false;
                }
            }
        }
        true
    }

    /// All maximal conflict-free subsets of the enabled set. Sizes are tried
    /// largest first; every set of the first non-empty size is returned so
    /// the scheduler can pick among them at random.
    pub fn find_non_conflicting_transitions(
        &mut self,
        enabled: &[String],
        net: &PetriNet,
    ) -> Vec<Vec<String>> {
        if enabled.len() <= 1 {
            return vec![enabled.to_vec()];
        }
        self.clear_cache();

        for size in (1..=enabled.len()).rev() {
            let sets: Vec<Vec<String>> = enabled
                .iter()
                .combinations(size)
                .filter(|combo| {
                    let ids: Vec<&str> = combo.iter().map(|s| s.as_str()).collect();
                    self.is_non_conflicting_set(&ids, net)
                })
                .map(|combo| combo.into_iter().cloned().collect())
                .collect();
            if !sets.is_empty() {
                return sets;
            }
        }
        enabled.iter().map(|t| vec![t.clone()]).collect()
    }
}

fn required_categories(transition_id: &str, net: &PetriNet) -> HashMap<String, Categories> {
    let mut needs: HashMap<String, Categories> = HashMap::new();
    for arc in net.input_arcs(transition_id) {
        let entry = needs.entry(arc.source.clone()).or_default();
        if arc.bindings.is_empty() {
            entry.int = true;
            continue;
        }
        for text in &arc.bindings {
            let cat = binding_category(text);
            entry.int |= cat.int;
            entry.boolean |= cat.boolean;
        }
    }
    needs
}
