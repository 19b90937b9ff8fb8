use crate::model::PetriNet;
use crate::simulator::{AlgebraicSimulator, SimError, SimulationMode};
use log::debug;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

// --- Configuration ---

/// Run-to-completion policy. Zero durations disable the respective cadence;
/// `batch_max` of zero means unbounded batches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub mode: SimulationMode,
    pub max_steps: u64,
    #[serde(with = "millis")]
    pub time_budget: Duration,
    /// Cooperative yield every this many steps.
    pub yield_every: u64,
    #[serde(with = "millis")]
    pub yield_interval: Duration,
    #[serde(with = "millis")]
    pub progress_interval: Duration,
    pub batch_max: usize,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            mode: SimulationMode::Single,
            max_steps: 100_000,
            time_budget: Duration::from_secs(30),
            yield_every: 100,
            yield_interval: Duration::ZERO,
            progress_interval: Duration::ZERO,
            batch_max: 0,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub steps: u64,
    pub elapsed: Duration,
}

/// Host callbacks polled at tick boundaries. All are cooperative; an
/// expensive single fire cannot be interrupted mid-search.
#[derive(Default)]
pub struct RunHooks<'a> {
    pub on_progress: Option<Box<dyn FnMut(Progress) + 'a>>,
    pub should_cancel: Option<Box<dyn Fn() -> bool + 'a>>,
    /// Invoked at yield cadences so a host can pump its event loop.
    pub yield_point: Option<Box<dyn FnMut() + 'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub steps: u64,
    pub elapsed: Duration,
}

// --- Structural Helpers ---

/// Transitions with no connected place on either side. They would count as
/// vacuously enabled forever, so the scheduler excludes them.
pub fn isolated_transitions(net: &PetriNet) -> HashSet<String> {
    net.transitions
        .iter()
        .filter(|t| net.input_arcs(&t.id).is_empty() && net.output_arcs(&t.id).is_empty())
        .map(|t| t.id.clone())
        .collect()
}

/// Greedy conflict-free batch: shuffle the enabled ids, then admit each
/// transition whose input places were not already claimed this batch.
fn choose_greedy_non_conflicting(
    enabled: &[String],
    net: &PetriNet,
    batch_max: usize,
    rng: &mut impl Rng,
) -> Vec<String> {
    let mut inputs_by_transition: HashMap<&str, HashSet<&str>> = HashMap::new();
    for id in enabled {
        inputs_by_transition.insert(
            id.as_str(),
            net.input_arcs(id).iter().map(|a| a.source.as_str()).collect(),
        );
    }

    let mut order: Vec<&String> = enabled.iter().collect();
    order.shuffle(rng);

    let mut used_places: HashSet<&str> = HashSet::new();
    let mut selection = Vec::new();
    for id in order {
        let inputs = &inputs_by_transition[id.as_str()];
        if inputs.iter().any(|p| used_places.contains(p)) {
            continue;
        }
        selection.push(id.clone());
        used_places.extend(inputs.iter().copied());
        if batch_max > 0 && selection.len() >= batch_max {
            break;
        }
    }
    selection
}

// --- Run Loop ---

struct ProgressReporter<'h, 'a> {
    hooks: &'h mut RunHooks<'a>,
    started: Instant,
    interval: Duration,
    last_bucket: Option<u128>,
}

impl ProgressReporter<'_, '_> {
    fn emit(&mut self, steps: u64) {
        let Some(on_progress) = self.hooks.on_progress.as_mut() else {
            return;
        };
        let elapsed = self.started.elapsed();
        let bucket = if self.interval > Duration::ZERO {
            elapsed.as_millis() / self.interval.as_millis().max(1)
        } else {
            0
        };
        if self.last_bucket == Some(bucket) {
            return;
        }
        self.last_bucket = Some(bucket);
        on_progress(Progress { steps, elapsed });
    }

    fn emit_final(&mut self, steps: u64) {
        if let Some(on_progress) = self.hooks.on_progress.as_mut() {
            on_progress(Progress {
                steps,
                elapsed: self.started.elapsed(),
            });
        }
    }

    fn cancelled(&self) -> bool {
        self.hooks
            .should_cancel
            .as_ref()
            .is_some_and(|cancel| cancel())
    }

    fn yield_now(&mut self) {
        if let Some(yield_point) = self.hooks.yield_point.as_mut() {
            yield_point();
        }
    }
}

/// Drives the simulator until no transition is enabled, the step or time
/// budget is exhausted, or the host cancels. Fire errors propagate; the
/// simulator keeps whatever progress was applied before the failure.
pub fn run_to_completion(
    simulator: &mut AlgebraicSimulator,
    config: &RunConfig,
    hooks: &mut RunHooks,
) -> Result<RunReport, SimError> {
    let started = Instant::now();
    let mut reporter = ProgressReporter {
        hooks,
        started,
        interval: config.progress_interval,
        last_bucket: None,
    };
    let isolated = isolated_transitions(simulator.state());
    let mut steps: u64 = 0;
    let mut last_progress = started;
    let mut last_yield = started;

    'run: while steps < config.max_steps {
        if reporter.cancelled() {
            break;
        }
        let enabled: Vec<String> = simulator
            .enabled_transitions()
            .into_iter()
            .filter(|id| !isolated.contains(id))
            .collect();
        if enabled.is_empty() {
            break;
        }

        match config.mode {
            SimulationMode::Maximal => {
                let (net, rng) = simulator.net_and_rng();
                let mut batch =
                    choose_greedy_non_conflicting(&enabled, net, config.batch_max, rng);
                if batch.is_empty() {
                    if let Some(fallback) = enabled.choose(&mut simulator.rng) {
                        batch.push(fallback.clone());
                    }
                }
                debug!("maximal batch of {}: {:?}", batch.len(), batch);
                for id in &batch {
                    simulator.fire_transition_unchecked(id)?;
                }
                steps += batch.len() as u64;
            }
            SimulationMode::Single => {
                let choice = enabled
                    .choose(&mut simulator.rng)
                    .cloned()
                    .unwrap_or_default();
                simulator.fire_transition(&choice)?;
                steps += 1;
            }
        }

        // Post-step bookkeeping: step-based yield first, then time-based
        // progress/yield cadences, then the budget checks.
        let now = Instant::now();
        if config.yield_every > 0 && steps % config.yield_every == 0 {
            reporter.emit(steps);
            reporter.yield_now();
            last_yield = Instant::now();
            last_progress = last_yield;
            if config.progress_interval > Duration::ZERO {
                reporter.emit(steps);
            }
            if over_budget(started, config.time_budget) || reporter.cancelled() {
                break 'run;
            }
            continue;
        }

        if config.progress_interval > Duration::ZERO
            && now.duration_since(last_progress) >= config.progress_interval
        {
            reporter.emit(steps);
            last_progress = now;
        }

        if config.yield_interval > Duration::ZERO
            && now.duration_since(last_yield) >= config.yield_interval
        {
            reporter.yield_now();
            last_yield = Instant::now();
            if config.progress_interval > Duration::ZERO
                && last_yield.duration_since(last_progress) >= config.progress_interval
            {
                reporter.emit(steps);
                last_progress = last_yield;
            }
        }

        if over_budget(started, config.time_budget) || reporter.cancelled() {
            break;
        }
    }

    reporter.emit_final(steps);
    Ok(RunReport {
        steps,
        elapsed: started.elapsed(),
    })
}

fn over_budget(started: Instant, budget: Duration) -> bool {
    budget > Duration::ZERO && started.elapsed() > budget
}
