use crate::assignment::{find_satisfying_assignment, has_unbound_variables, Assignment};
use crate::binding::BindingCache;
use crate::eval::evaluate_action;
use crate::model::{NetError, PetriNet, SimulationEvent};
use crate::oracle::SatOracle;
use crate::token_io::{consume_tokens, produce_tokens};
use anyhow::Context;
use log::{debug, info};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Options ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SimulationMode {
    #[default]
    Single,
    Maximal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SimOptions {
    /// Cap on candidate tokens considered per place during assignment
    /// search. Keeps the backtracking bounded on heavily-marked places.
    pub max_tokens_per_place: usize,
    pub mode: SimulationMode,
    /// Seed for the transition-choice RNG. Unseeded runs draw from OS
    /// entropy.
    pub rng_seed: Option<u64>,
}

impl Default for SimOptions {
    fn default() -> SimOptions {
        SimOptions {
            max_tokens_per_place: 20,
            mode: SimulationMode::Single,
            rng_seed: None,
        }
    }
}

// --- Errors ---

#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown transition '{0}'")]
    UnknownTransition(String),
    #[error("transition '{0}' is not enabled")]
    NotEnabled(String),
}

// --- Simulator ---

type EventSink = Box<dyn FnMut(SimulationEvent) + Send>;

/// Simulation engine over one exclusively-owned net snapshot. Callers hand
/// in net updates through [`AlgebraicSimulator::update`]; the engine never
/// shares live references back.
pub struct AlgebraicSimulator {
    net: PetriNet,
    cache: BindingCache,
    options: SimOptions,
    pub(crate) rng: StdRng,
    oracle: Option<Box<dyn SatOracle>>,
    event_sink: Option<EventSink>,
    previously_enabled: Vec<String>,
}

impl AlgebraicSimulator {
    pub fn new(net: PetriNet, options: SimOptions) -> Result<AlgebraicSimulator, NetError> {
        net.validate()?;
        let cache = BindingCache::build(&net);
        let rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            "simulator ready: {} places, {} transitions, {} arcs",
            net.places.len(),
            net.transitions.len(),
            net.arcs.len()
        );
        Ok(AlgebraicSimulator {
            net,
            cache,
            options,
            rng,
            oracle: None,
            event_sink: None,
            previously_enabled: Vec::new(),
        })
    }

    /// Builds a simulator from a JSON net description.
    pub fn from_json(json: &str, options: SimOptions) -> anyhow::Result<AlgebraicSimulator> {
        let net: PetriNet =
            serde_json::from_str(json).context("failed to parse net description")?;
        AlgebraicSimulator::new(net, options).context("invalid net structure")
    }

    pub fn state(&self) -> &PetriNet {
        &self.net
    }

    /// Split borrow for schedulers that need the net and the RNG at once.
    pub(crate) fn net_and_rng(&mut self) -> (&PetriNet, &mut StdRng) {
        (&self.net, &mut self.rng)
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    pub fn set_simulation_mode(&mut self, mode: SimulationMode) {
        self.options.mode = mode;
    }

    pub fn set_oracle(&mut self, oracle: Box<dyn SatOracle>) {
        self.oracle = Some(oracle);
    }

    /// Registers the callback receiving [`SimulationEvent`]s. There is no
    /// global bus; one sink per simulator.
    pub fn set_event_sink(&mut self, sink: EventSink) {
        self.event_sink = Some(sink);
    }

    /// Replaces the working net. The parse caches are rebuilt only when the
    /// guard/binding text actually changed; marking-only updates keep them.
    pub fn update(&mut self, net: PetriNet) -> Result<(), NetError> {
        net.validate()?;
        self.net = net;
        if self.cache.rebuild_if_changed(&self.net) {
            debug!("inscription text changed, caches rebuilt");
        }
        self.emit_transitions_changed();
        Ok(())
    }

    // --- Enabling ---

    /// Ids of all currently enabled transitions, in net order.
    pub fn enabled_transitions(&self) -> Vec<String> {
        self.net
            .transitions
            .iter()
            .filter(|t| self.is_transition_enabled(&t.id))
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn is_transition_enabled(&self, transition_id: &str) -> bool {
        self.find_assignment(transition_id).is_some()
    }

    fn find_assignment(&self, transition_id: &str) -> Option<Assignment> {
        let transition = self.net.find_transition(transition_id)?;
        let input_arcs = self.net.input_arcs(transition_id);
        if has_unbound_variables(&self.net, &self.cache, transition_id, &input_arcs) {
            return None;
        }
        find_satisfying_assignment(
            &self.net,
            transition,
            &input_arcs,
            &self.cache,
            self.oracle.as_deref(),
            self.options.max_tokens_per_place,
        )
    }

    // --- Firing ---

    /// Fires one transition: resolves an assignment, consumes the picked
    /// tokens, produces outputs, and emits events. The whole fire is one
    /// logical step; no partial fire is ever observable.
    pub fn fire_transition(&mut self, transition_id: &str) -> Result<(), SimError> {
        if self.net.find_transition(transition_id).is_none() {
            return Err(SimError::UnknownTransition(transition_id.to_string()));
        }
        let assignment = self
            .find_assignment(transition_id)
            .ok_or_else(|| SimError::NotEnabled(transition_id.to_string()))?;
        self.apply(transition_id, assignment);
        Ok(())
    }

    /// Batch-mode variant: the caller already established enablement this
    /// tick, so a failed re-resolution is still reported as not enabled but
    /// without the upfront check cost.
    pub(crate) fn fire_transition_unchecked(&mut self, transition_id: &str) -> Result<(), SimError> {
        let assignment = self
            .find_assignment(transition_id)
            .ok_or_else(|| SimError::NotEnabled(transition_id.to_string()))?;
        self.apply(transition_id, assignment);
        Ok(())
    }

    fn apply(&mut self, transition_id: &str, assignment: Assignment) {
        consume_tokens(&assignment.picks, &mut self.net);
        produce_tokens(&mut self.net, transition_id, &self.cache, &assignment.env);

        if let Some(action) = self
            .net
            .find_transition(transition_id)
            .and_then(|t| t.action.clone())
        {
            match evaluate_action(&action, &assignment.env) {
                Ok(results) => {
                    for (name, value) in results {
                        debug!("action on {}: {} = {}", transition_id, name, value);
                    }
                }
                Err(err) => debug!("action on {} failed: {}", transition_id, err),
            }
        }

        if let Some(sink) = self.event_sink.as_mut() {
            sink(SimulationEvent::TransitionFired {
                transition_id: transition_id.to_string(),
                new_net: self.net.clone(),
            });
        }
        self.emit_transitions_changed();
    }

    /// Single-mode tick: fires one enabled transition chosen uniformly at
    /// random. Returns the fired id, or `None` when nothing is enabled.
    pub fn step(&mut self) -> Result<Option<String>, SimError> {
        let enabled = self.enabled_transitions();
        let Some(choice) = enabled.choose(&mut self.rng).cloned() else {
            return Ok(None);
        };
        self.fire_transition(&choice)?;
        Ok(Some(choice))
    }

    fn emit_transitions_changed(&mut self) {
        let enabled = self.enabled_transitions();
        if self.event_sink.is_some() {
            let previously_enabled = std::mem::take(&mut self.previously_enabled);
            let has_enabled = !enabled.is_empty();
            if let Some(sink) = self.event_sink.as_mut() {
                sink(SimulationEvent::TransitionsChanged {
                    enabled: enabled.clone(),
                    previously_enabled,
                    has_enabled,
                });
            }
        }
        self.previously_enabled = enabled;
    }
}
