//! Exact inference after a terminal decision.
//!
//! Both designs order outcomes by the smallest overall level at which the
//! observed path would have rejected. For a drift `theta` let
//!
//! ```text
//! P(theta) = inf { a : the design run at level a rejects the path x_j - theta t_j }
//! ```
//!
//! `P` increases in `theta`. The p-value is `P(0)`; the median-unbiased
//! estimate solves `P = 1/2`; the `1 - 2 alpha` confidence limits solve
//! `P = alpha` and `P = 1 - alpha`.
//!
//! Each evaluation of `P` is itself a bisection over the level, re-running the
//! full stage recursion on the truncated, re-centered history.

use serde::Serialize;
use seq_common::{Error, Result};
use seq_math::{bisect, BisectionConfig};

use super::{run_stages, ConditionalErrorDesign, History, StageTrace};
use crate::logging::{event_names, Stage};

const MIN_LEVEL: f64 = 1e-12;
const MAX_LEVEL: f64 = 1.0 - 1e-12;
/// Effect searches span this many standard errors around the naive estimate.
const EFFECT_SEARCH_SPAN: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimateReport {
    pub p_value: f64,
    pub median_unbiased: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    /// Two-sided coverage of `[lower_limit, upper_limit]`.
    pub coverage: f64,
    /// `x / t` at the deciding analysis.
    pub naive: f64,
    /// Analysis the inference conditions on.
    pub decided_at: usize,
}

/// Exact p-value, median-unbiased estimate and confidence limits.
///
/// Requires `trace` to end in a terminal decision; the history is cut at the
/// deciding analysis.
pub fn estimate<D: ConditionalErrorDesign>(
    design: &D,
    history: &History,
    trace: &StageTrace,
    final_analysis: bool,
) -> Result<EstimateReport> {
    if !trace.outcome.is_terminal() {
        return Err(Error::invalid(
            "estimate",
            "exact inference requires a terminal decision (interim stop or final analysis)",
        ));
    }
    let path = history.truncated(trace.decided_at);
    let at_final = final_analysis && trace.decided_at == history.analyses();
    let alpha = design.alpha();
    let config = design.numerics().estimate_bisection();

    let p_value = smallest_rejecting_level(design, &path, at_final, 0.0)?;
    log_solved("p_value", p_value);

    let naive = path.last_stat() / path.last_time();
    let se = path.last_time().sqrt().recip();
    let search = EffectSearch {
        design,
        path: &path,
        at_final,
        lower: naive - EFFECT_SEARCH_SPAN * se,
        upper: naive + EFFECT_SEARCH_SPAN * se,
        config,
    };
    let median_unbiased = search.solve(0.5)?;
    log_solved("median_unbiased", median_unbiased);
    let lower_limit = search.solve(alpha)?;
    log_solved("lower_limit", lower_limit);
    let upper_limit = search.solve(1.0 - alpha)?;
    log_solved("upper_limit", upper_limit);

    Ok(EstimateReport {
        p_value,
        median_unbiased,
        lower_limit,
        upper_limit,
        coverage: 1.0 - 2.0 * alpha,
        naive,
        decided_at: trace.decided_at,
    })
}

fn log_solved(quantity: &'static str, value: f64) {
    tracing::debug!(
        event = event_names::ESTIMATE_SOLVED,
        stage = %Stage::Estimate,
        quantity,
        value,
        "estimate solved"
    );
}

/// `P(theta)`: smallest level at which the shifted path is rejected.
fn smallest_rejecting_level<D: ConditionalErrorDesign>(
    design: &D,
    path: &History,
    at_final: bool,
    theta: f64,
) -> Result<f64> {
    let shifted = path.shifted(theta);
    let rejects = |level: f64| -> Result<bool> {
        Ok(run_stages(design, &shifted, at_final, level)?.outcome.rejects())
    };
    if rejects(MIN_LEVEL)? {
        return Ok(MIN_LEVEL);
    }
    if !rejects(MAX_LEVEL)? {
        return Ok(1.0);
    }

    let mut failure: Option<Error> = None;
    let result = bisect(
        |ln_level| match rejects(ln_level.exp()) {
            Ok(true) => 1.0,
            Ok(false) => -1.0,
            Err(e) => {
                failure.get_or_insert(e);
                f64::NAN
            }
        },
        MIN_LEVEL.ln(),
        MAX_LEVEL.ln(),
        &design.numerics().estimate_bisection(),
    );
    if let Some(e) = failure {
        return Err(e);
    }
    let root = result.map_err(|e| Error::from_root("rejection_level", e))?;
    Ok((root.value + root.half_width).exp().min(1.0))
}

struct EffectSearch<'a, D> {
    design: &'a D,
    path: &'a History,
    at_final: bool,
    lower: f64,
    upper: f64,
    config: BisectionConfig,
}

impl<D: ConditionalErrorDesign> EffectSearch<'_, D> {
    /// Drift at which `P(theta)` crosses `target`.
    fn solve(&self, target: f64) -> Result<f64> {
        let mut failure: Option<Error> = None;
        let result = bisect(
            |theta| match smallest_rejecting_level(self.design, self.path, self.at_final, theta) {
                Ok(level) => level - target,
                Err(e) => {
                    failure.get_or_insert(e);
                    f64::NAN
                }
            },
            self.lower,
            self.upper,
            &self.config,
        );
        if let Some(e) = failure {
            return Err(e);
        }
        result
            .map(|root| root.value)
            .map_err(|e| Error::from_root("estimate_effect", e))
    }
}
