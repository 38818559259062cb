//! Conditional power and sample-size planning.
//!
//! From the last analysis `(t_k, x_k)` with leftover error `alpha_k`, the
//! final analysis at `n` rejects under drift `mu` with probability
//!
//! ```text
//! power(n) = Phi(Phi^-1(alpha_k) + mu sqrt(n - t_k))
//! ```
//!
//! With one more interim analysis planned at `t'`, the interim boundary `b'`
//! is solved first and the final look inherits the interim conditional error:
//!
//! ```text
//! power(n) = P_mu(X_{t'} >= b') + E_mu[Phi(Phi^-1(CE(X_{t'})) + mu sqrt(n - t')); X_{t'} < b']
//! ```
//!
//! The sample size is the smallest `n` with `power(n) >= target`, found by
//! bisection on `n - t0` after doubling the bracket from the fixed-sample guess.
//! `t0` is the next look when one is planned, otherwise the last analysis.
//! `power(t0)` is the zero-information limit of the curve: `alpha_k` without an
//! interim, interim rejection plus `E_mu[CE(X_{t'})]` with one. When it already
//! meets the target no further information is needed.

use serde::{Deserialize, Serialize};
use seq_common::{Error, Result};
use seq_math::{bisect, expect_below, normal_cdf, normal_quantile, normal_sf, BisectionConfig};

use super::{
    check_effect, check_probability, run_stages, AnalysisState, ConditionalErrorDesign, History,
    StageSolution,
};
use crate::logging::{event_names, Stage};

/// The initial bracket ends at this multiple of the fixed-sample guess.
const BRACKET_FACTOR: f64 = 10.0;

/// An additional interim analysis planned before the final one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextLook {
    pub time: f64,
    /// Working-clock time; defaults to advancing the clock with information.
    pub cost: Option<f64>,
}

impl NextLook {
    pub fn at(time: f64) -> Self {
        Self { time, cost: None }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerReport {
    pub alternative: f64,
    pub final_time: f64,
    pub power: f64,
    /// Rejection probability at the planned interim analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interim_power: Option<f64>,
    /// Leftover error after the last observed analysis.
    pub cond_error: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleSizeReport {
    pub alternative: f64,
    pub target_power: f64,
    /// Information at the last observed analysis.
    pub current_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_time: Option<f64>,
    pub final_time: f64,
    /// `final_time - current_time`.
    pub remaining_information: f64,
    pub achieved_power: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interim_power: Option<f64>,
    /// The target is met with no information beyond the next look (or the
    /// last analysis when none is planned).
    pub overpowered: bool,
    /// Fixed-sample remaining information from the current state.
    pub fixed_sample_estimate: f64,
    pub iterations: usize,
}

/// Power at a planned final analysis.
pub fn compute_power<D: ConditionalErrorDesign>(
    design: &D,
    history: &History,
    alternative: f64,
    final_time: f64,
    next: Option<NextLook>,
) -> Result<PowerReport> {
    check_effect("alternative", alternative)?;
    let model = PowerModel::new(design, history, alternative, next)?;
    if !final_time.is_finite() || final_time <= model.origin_time() {
        return Err(Error::InvalidSchedule(format!(
            "final time {final_time} must exceed {}",
            model.origin_time()
        )));
    }
    let power = model.power(final_time);
    tracing::debug!(
        event = event_names::POWER_EVALUATED,
        stage = %Stage::SampleSize,
        alternative,
        final_time,
        power,
        "power evaluated"
    );
    Ok(PowerReport {
        alternative,
        final_time,
        power,
        interim_power: model.interim.as_ref().map(|_| model.interim_power()),
        cond_error: model.start.cond_error,
    })
}

/// Final information needed to reach `target_power` under `alternative`.
pub fn compute_sample_size<D: ConditionalErrorDesign>(
    design: &D,
    history: &History,
    alternative: f64,
    target_power: f64,
    next: Option<NextLook>,
) -> Result<SampleSizeReport> {
    check_effect("alternative", alternative)?;
    check_probability("power", target_power)?;
    let model = PowerModel::new(design, history, alternative, next)?;
    let origin = model.origin_time();
    let current_time = model.start.time;
    let next_time = model.interim.as_ref().map(|(t, _)| *t);
    let interim_power = model.interim.as_ref().map(|_| model.interim_power());

    let fixed_sample_estimate =
        ((normal_quantile(model.start.cond_error) - normal_quantile(target_power)) / alternative).powi(2);

    let max_iter = design.numerics().max_iter;
    let scale = fixed_sample_estimate.max(1.0);
    let shortfall = |increment: f64| target_power - model.power(origin + increment);

    if shortfall(0.0) <= 0.0 {
        return Ok(SampleSizeReport {
            alternative,
            target_power,
            current_time,
            next_time,
            final_time: origin,
            remaining_information: origin - current_time,
            achieved_power: model.power(origin),
            interim_power,
            overpowered: true,
            fixed_sample_estimate,
            iterations: 0,
        });
    }

    let mut upper = BRACKET_FACTOR * scale;
    let mut doublings = 0;
    while shortfall(upper) > 0.0 {
        if doublings >= max_iter {
            return Err(Error::NoBracket {
                site: "sample_size",
                lower: 0.0,
                upper,
            });
        }
        upper *= 2.0;
        doublings += 1;
    }

    let config = BisectionConfig::new(design.numerics().tol_sample_size * scale, max_iter);
    let root = bisect(shortfall, 0.0, upper, &config)
        .map_err(|e| Error::from_root("sample_size", e))?;
    let final_time = origin + root.value;
    let achieved_power = model.power(final_time);

    tracing::debug!(
        event = event_names::SAMPLE_SIZE_SOLVED,
        stage = %Stage::SampleSize,
        alternative,
        target_power,
        final_time,
        achieved_power,
        iterations = root.iterations + doublings,
        "sample size solved"
    );

    Ok(SampleSizeReport {
        alternative,
        target_power,
        current_time,
        next_time,
        final_time,
        remaining_information: final_time - current_time,
        achieved_power,
        interim_power,
        overpowered: false,
        fixed_sample_estimate,
        iterations: root.iterations + doublings,
    })
}

/// Power as a function of the final time, for a fixed state and optional interim look.
struct PowerModel<S> {
    start: AnalysisState,
    alternative: f64,
    interim: Option<(f64, S)>,
    div: usize,
}

impl<S: StageSolution> PowerModel<S> {
    fn new<D>(design: &D, history: &History, alternative: f64, next: Option<NextLook>) -> Result<Self>
    where
        D: ConditionalErrorDesign<Stage = S>,
    {
        let trace = run_stages(design, history, false, design.alpha())?;
        if trace.outcome.is_terminal() {
            return Err(Error::invalid(
                "history",
                format!("trial already reached {} at analysis {}", trace.outcome, trace.decided_at),
            ));
        }
        let start = trace.last;
        let interim = match next {
            Some(look) => {
                if !look.time.is_finite() || look.time <= start.time {
                    return Err(Error::InvalidSchedule(format!(
                        "next look {} must exceed the last analysis time {}",
                        look.time, start.time
                    )));
                }
                let cost = look
                    .cost
                    .unwrap_or(history.last_cost() + (look.time - history.last_time()));
                let stage = design.solve_stage(&start, look.time, cost)?;
                Some((look.time, stage))
            }
            None => None,
        };
        Ok(Self {
            start,
            alternative,
            interim,
            div: design.numerics().simpson_div,
        })
    }

    /// Time of the last look before the final one.
    fn origin_time(&self) -> f64 {
        self.interim.as_ref().map_or(self.start.time, |(t, _)| *t)
    }

    fn interim_power(&self) -> f64 {
        match &self.interim {
            Some((time, stage)) => {
                let d = time - self.start.time;
                let mean = self.start.stat + self.alternative * d;
                normal_sf((stage.boundary() - mean) / d.sqrt())
            }
            None => 0.0,
        }
    }

    fn power(&self, final_time: f64) -> f64 {
        let mu = self.alternative;
        match &self.interim {
            None => {
                let remaining = final_time - self.start.time;
                normal_cdf(normal_quantile(self.start.cond_error) + mu * remaining.sqrt())
            }
            Some((time, stage)) => {
                let d = time - self.start.time;
                let mean = self.start.stat + mu * d;
                let shift = mu * (final_time - time).sqrt();
                let later = expect_below(mean, d, stage.boundary(), self.div, |x| {
                    normal_cdf(normal_quantile(stage.approx_conditional_error(x)) + shift)
                });
                self.interim_power() + later
            }
        }
    }
}
