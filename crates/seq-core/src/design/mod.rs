//! Conditional-error sequential designs.
//!
//! Both designs share one recursion. Starting from the overall level at time
//! 0, each interim analysis solves for a rejection boundary that spends
//! exactly the conditional error left over from the previous analysis, then
//! converts the observed statistic into the next conditional error. A final
//! analysis spends whatever is left with an exact normal boundary.
//!
//! ```text
//! alpha_0 = alpha
//! for each analysis k:
//!     boundary b_k  <- solve(alpha_{k-1}, t_{k-1}, t_k)
//!     alpha_k       <- CE(x_k)              (1 once x_k >= b_k)
//! ```
//!
//! A design plugs into the recursion by implementing
//! [`ConditionalErrorDesign`]. The fold in [`run_stages`] owns the state
//! machine; designs only supply boundaries and conditional errors.

pub mod estimate;
pub mod global;
pub mod history;
pub mod local;
pub mod sample_size;
pub mod working_test;

pub use estimate::{estimate, EstimateReport};
pub use global::GlobalDesign;
pub use history::{Analysis, History};
pub use local::LocalDesign;
pub use sample_size::{compute_power, compute_sample_size, NextLook, PowerReport, SampleSizeReport};
pub use working_test::{WorkingTest, WorkingTestSpec};

use serde::{Deserialize, Serialize};
use seq_common::{Error, Result};
use seq_math::normal_quantile;

use crate::config::NumericsConfig;
use crate::logging::{event_names, Stage};

/// Trial state after an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Keep collecting data.
    Continue,
    /// Conditional error reached 1 at an interim analysis.
    InterimStop,
    /// Final analysis crossed its boundary.
    FinalReject,
    /// Final analysis stayed below its boundary, or no error is left to spend.
    FinalAccept,
}

impl Decision {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Decision::Continue)
    }

    /// Whether the null hypothesis is rejected.
    pub fn rejects(self) -> bool {
        matches!(self, Decision::InterimStop | Decision::FinalReject)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Continue => write!(f, "CONTINUE"),
            Decision::InterimStop => write!(f, "INTERIM_STOP"),
            Decision::FinalReject => write!(f, "FINAL_REJECT"),
            Decision::FinalAccept => write!(f, "FINAL_ACCEPT"),
        }
    }
}

/// Which engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DesignKind {
    Local,
    Global,
}

impl std::fmt::Display for DesignKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesignKind::Local => write!(f, "local"),
            DesignKind::Global => write!(f, "global"),
        }
    }
}

/// Working values carried from one analysis to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalysisState {
    pub time: f64,
    pub stat: f64,
    /// Conditional Type I error left to spend.
    pub cond_error: f64,
    /// Working-boundary intercept (local design).
    pub intercept: Option<f64>,
    /// Rejection boundary applied at `time`.
    pub boundary: f64,
    /// Working-test clock (global design; equals `time` for the local design).
    pub working_time: f64,
    /// Working-test equivalent statistic (global design).
    pub working_stat: f64,
}

/// Per-analysis output row. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub analysis: usize,
    pub time: f64,
    pub stat: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intercept: Option<f64>,
    pub boundary: f64,
    pub cond_error: f64,
    pub reject: bool,
    pub is_final: bool,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_stat: Option<f64>,
}

/// A solved interim boundary, ready to score any statistic at that look.
pub trait StageSolution {
    /// Rejection boundary on the statistic scale.
    fn boundary(&self) -> f64;

    fn intercept(&self) -> Option<f64> {
        None
    }

    /// Conditional error after observing `stat`; 1 once the boundary is crossed.
    fn conditional_error(&self, stat: f64) -> f64;

    /// Cheaper conditional error for use inside quadrature loops.
    fn approx_conditional_error(&self, stat: f64) -> f64 {
        self.conditional_error(stat)
    }

    /// State carried to the next analysis after observing `stat`.
    fn advance(&self, stat: f64) -> AnalysisState;
}

/// An engine that turns leftover conditional error into the next boundary.
pub trait ConditionalErrorDesign {
    type Stage: StageSolution;

    fn kind(&self) -> DesignKind;

    /// Overall significance level.
    fn alpha(&self) -> f64;

    fn numerics(&self) -> &NumericsConfig;

    /// State at time 0 when the whole trial is run at `level`.
    fn start(&self, level: f64) -> Result<AnalysisState>;

    /// Solve the boundary for an interim analysis at `time` (working clock `cost`).
    fn solve_stage(&self, prev: &AnalysisState, time: f64, cost: f64) -> Result<Self::Stage>;

    /// Intercept reported alongside a final-analysis boundary.
    fn final_intercept(&self, _time: f64, _boundary: f64) -> Option<f64> {
        None
    }
}

/// Options shared by both analysis entry points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// The last supplied analysis is the final one.
    pub final_analysis: bool,
    /// Compute exact p-value, median-unbiased estimate and confidence limits.
    pub estimate: bool,
}

/// Output of the stage fold.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTrace {
    /// One entry per analysis; `None` after a terminal decision.
    pub records: Vec<Option<DecisionRecord>>,
    /// State after the last evaluated analysis.
    pub last: AnalysisState,
    pub outcome: Decision,
    /// Number of the analysis that produced `outcome` (0 if none ran).
    pub decided_at: usize,
}

/// Exact boundary for the final analysis: spend all of `cond_error` at once.
pub fn final_boundary(prev: &AnalysisState, time: f64) -> f64 {
    prev.stat - normal_quantile(prev.cond_error) * (time - prev.time).sqrt()
}

/// Classify an interim conditional error.
pub fn interim_decision(cond_error: f64) -> Decision {
    if cond_error >= 1.0 {
        Decision::InterimStop
    } else if cond_error <= 0.0 {
        Decision::FinalAccept
    } else {
        Decision::Continue
    }
}

/// Run the analysis-by-analysis recursion at overall level `level`.
pub fn run_stages<D: ConditionalErrorDesign>(
    design: &D,
    history: &History,
    final_analysis: bool,
    level: f64,
) -> Result<StageTrace> {
    let stage = match design.kind() {
        DesignKind::Local => Stage::Local,
        DesignKind::Global => Stage::Global,
    };
    let mut state = design.start(level)?;
    let mut outcome = Decision::Continue;
    let mut decided_at = 0;
    let mut records = Vec::with_capacity(history.analyses());
    let last_index = history.analyses();

    for analysis in history.iter() {
        if outcome.is_terminal() {
            tracing::trace!(
                event = event_names::STAGE_SKIPPED,
                stage = %stage,
                analysis = analysis.index,
                "analysis after terminal decision"
            );
            records.push(None);
            continue;
        }

        let is_final = final_analysis && analysis.index == last_index;
        let (next, record) = if is_final {
            let boundary = final_boundary(&state, analysis.time);
            let reject = analysis.stat >= boundary;
            let decision = if reject {
                Decision::FinalReject
            } else {
                Decision::FinalAccept
            };
            let cond_error = if reject { 1.0 } else { 0.0 };
            let intercept = design.final_intercept(analysis.time, boundary);
            let next = AnalysisState {
                time: analysis.time,
                stat: analysis.stat,
                cond_error,
                intercept,
                boundary,
                working_time: analysis.cost,
                working_stat: state.working_stat,
            };
            (next, record_for(design.kind(), analysis, &next, true, decision))
        } else {
            let solution = design.solve_stage(&state, analysis.time, analysis.cost)?;
            let next = solution.advance(analysis.stat);
            let decision = interim_decision(next.cond_error);
            (next, record_for(design.kind(), analysis, &next, false, decision))
        };

        tracing::debug!(
            event = event_names::STAGE_EVALUATED,
            stage = %stage,
            analysis = analysis.index,
            time = analysis.time,
            stat = analysis.stat,
            boundary = next.boundary,
            cond_error = next.cond_error,
            decision = %record.decision,
            "stage evaluated"
        );

        outcome = record.decision;
        decided_at = analysis.index;
        state = next;
        records.push(Some(record));
    }

    Ok(StageTrace {
        records,
        last: state,
        outcome,
        decided_at,
    })
}

fn record_for(
    kind: DesignKind,
    analysis: Analysis,
    state: &AnalysisState,
    is_final: bool,
    decision: Decision,
) -> DecisionRecord {
    let global = kind == DesignKind::Global;
    DecisionRecord {
        analysis: analysis.index,
        time: analysis.time,
        stat: analysis.stat,
        intercept: state.intercept,
        boundary: state.boundary,
        cond_error: state.cond_error,
        reject: decision.rejects(),
        is_final,
        decision,
        working_time: global.then_some(state.working_time),
        working_stat: global.then_some(state.working_stat),
    }
}

/// Parameters echoed back with every report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "design", rename_all = "lowercase")]
pub enum DesignParameters {
    Local {
        alpha: f64,
        effect: f64,
    },
    Global {
        alpha: f64,
        work_beta: f64,
        effect: f64,
        cost_type_1_err: f64,
        cost_type_2_err: f64,
    },
}

/// Result of an analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub parameters: DesignParameters,
    pub final_analysis: bool,
    /// Number of analyses supplied.
    pub analyses: usize,
    pub stages: Vec<Option<DecisionRecord>>,
    pub decision: Decision,
    pub rejected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimateReport>,
}

impl AnalysisReport {
    /// Rejection flag per analysis; `None` for analyses after a terminal decision.
    pub fn rejections(&self) -> Vec<Option<bool>> {
        self.stages
            .iter()
            .map(|s| s.as_ref().map(|r| r.reject))
            .collect()
    }
}

/// Run a design over a history and assemble the report.
pub fn analyze<D: ConditionalErrorDesign>(
    design: &D,
    parameters: DesignParameters,
    history: &History,
    options: AnalysisOptions,
) -> Result<AnalysisReport> {
    if history.is_empty() {
        return Err(Error::invalid("times", "at least one analysis is required"));
    }
    tracing::debug!(
        event = event_names::HISTORY_VALIDATED,
        stage = %Stage::Validate,
        analyses = history.analyses(),
        final_analysis = options.final_analysis,
        "history validated"
    );

    let trace = run_stages(design, history, options.final_analysis, design.alpha())?;
    let estimate = if options.estimate {
        Some(estimate::estimate(design, history, &trace, options.final_analysis)?)
    } else {
        None
    };

    Ok(AnalysisReport {
        parameters,
        final_analysis: options.final_analysis,
        analyses: history.analyses(),
        stages: trace.records,
        decision: trace.outcome,
        rejected: trace.outcome.rejects(),
        estimate,
    })
}

/// Validate a probability strictly inside (0, 1).
pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("must lie in (0, 1), got {value}")))
    }
}

/// Validate a strictly positive, finite effect size.
pub(crate) fn check_effect(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(name, format!("must be positive and finite, got {value}")))
    }
}
