use crate::model::PetriNet;
use crate::runner::RunConfig;
use crate::simulator::SimOptions;
use serde::{Deserialize, Serialize};

// --- Worker Protocol ---

/// Requests accepted by a run worker. The worker owns a private copy of the
/// net for the run's duration and reports back only messages, never live
/// references.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", content = "payload", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    Start {
        net: PetriNet,
        #[serde(default)]
        options: SimOptions,
        #[serde(default)]
        run_config: RunConfig,
    },
    /// Cooperative termination; honored at the next tick boundary.
    Cancel,
    /// Optionally pre-initializes the oracle pool before the first run.
    Prewarm,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub steps: u64,
    pub elapsed_ms: u64,
}

/// Replies emitted by a run worker: zero or more progress reports, then one
/// terminal `done` or `error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", content = "payload", rename_all = "camelCase")]
pub enum WorkerReply {
    #[serde(rename_all = "camelCase")]
    Progress { steps: u64, elapsed_ms: u64 },
    Done { elements: PetriNet, stats: RunStats },
    Error { message: String },
}
