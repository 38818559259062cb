//! Structured event vocabulary for logging.
//!
//! Library code emits plain `tracing` events carrying an `event` name from
//! [`event_names`] and a `stage` field; the subscriber decides how to render
//! them.

use serde::{Deserialize, Serialize};

/// Processing stages of a sequential analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// CLI startup and configuration.
    Init,
    /// Input normalization and validation.
    Validate,
    /// Local-design stage recursion.
    Local,
    /// Working-test construction.
    Build,
    /// Global-design stage recursion.
    Global,
    /// Sample-size and power planning.
    SampleSize,
    /// Exact inference after a terminal decision.
    Estimate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Validate => "validate",
            Stage::Local => "local",
            Stage::Build => "build",
            Stage::Global => "global",
            Stage::SampleSize => "sample_size",
            Stage::Estimate => "estimate",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Input
    pub const HISTORY_VALIDATED: &str = "history.validated";

    // Stage recursion
    pub const STAGE_EVALUATED: &str = "stage.evaluated";
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    pub const INTERCEPT_SATURATED: &str = "stage.intercept_saturated";
    pub const BOUNDARY_UNBOUNDED: &str = "stage.boundary_unbounded";

    // Working test
    pub const WORKING_TEST_BUILT: &str = "working_test.built";
    pub const COST_CALIBRATED: &str = "working_test.cost_calibrated";

    // Planning and inference
    pub const SAMPLE_SIZE_SOLVED: &str = "planning.sample_size_solved";
    pub const POWER_EVALUATED: &str = "planning.power_evaluated";
    pub const ESTIMATE_SOLVED: &str = "estimate.solved";
}
