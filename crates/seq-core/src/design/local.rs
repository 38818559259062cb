//! Local design: an SPRT-shaped working boundary re-solved at every look.
//!
//! The working test is the sequential probability ratio test for drift `rho`
//! with intercept `xi_0 = -ln(alpha) / rho`. Its conditional error from state
//! `x` below the line `xi + rho t / 2` is `exp(-rho (b - x))`. At each interim
//! analysis with increment `d`, the relative intercept `xi'` solves
//!
//! ```text
//! Q(xi') = P(X_d >= xi' + rho d/2) + E[exp(-rho (xi' + rho d/2 - X_d)); X_d below]
//!        = Phi_bar((xi' + rho d/2)/sqrt d) + exp(-rho xi') Phi((xi' - rho d/2)/sqrt d)
//!        = alpha_{k-1}
//! ```
//!
//! so the look spends exactly the leftover conditional error. `Q` is strictly
//! decreasing, so bisection on `[0, 20 xi_cond]` with `xi_cond = -ln(alpha_{k-1}) / rho`
//! finds the root.

use serde::Serialize;
use seq_common::{Error, Result};
use seq_math::{bisect, exp_probability, normal_log_cdf, normal_sf};

use super::{
    analyze, check_effect, check_probability, AnalysisOptions, AnalysisReport, AnalysisState,
    ConditionalErrorDesign, DesignKind, DesignParameters, History, StageSolution,
};
use crate::config::NumericsConfig;
use crate::logging::{event_names, Stage};

/// Width of the intercept search relative to the SPRT intercept.
const INTERCEPT_SEARCH_FACTOR: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalDesign {
    alpha: f64,
    effect: f64,
    #[serde(skip)]
    numerics: NumericsConfig,
}

impl LocalDesign {
    pub fn new(alpha: f64, effect: f64, numerics: NumericsConfig) -> Result<Self> {
        check_probability("alpha", alpha)?;
        check_effect("effect", effect)?;
        Ok(Self {
            alpha,
            effect,
            numerics,
        })
    }

    pub fn effect(&self) -> f64 {
        self.effect
    }

    /// SPRT intercept for a trial run at `level`.
    pub fn initial_intercept(&self, level: f64) -> f64 {
        -level.ln() / self.effect
    }

    pub fn parameters(&self) -> DesignParameters {
        DesignParameters::Local {
            alpha: self.alpha,
            effect: self.effect,
        }
    }

    /// Evaluate every analysis in `times` / `stats`.
    pub fn analyze(&self, times: &[f64], stats: &[f64], options: AnalysisOptions) -> Result<AnalysisReport> {
        let history = History::new(times, stats)?;
        analyze(self, self.parameters(), &history, options)
    }

    /// Spent probability of a look with relative intercept `xi` over increment `d`.
    fn stage_probability(&self, xi: f64, d: f64) -> f64 {
        let rho = self.effect;
        let sd = d.sqrt();
        let half_drift = 0.5 * rho * d;
        let crossing = normal_sf((xi + half_drift) / sd);
        let below = (-rho * xi + normal_log_cdf((xi - half_drift) / sd)).exp();
        crossing + below
    }
}

/// A solved local-design look.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalStage {
    effect: f64,
    time: f64,
    boundary: f64,
}

impl StageSolution for LocalStage {
    fn boundary(&self) -> f64 {
        self.boundary
    }

    fn intercept(&self) -> Option<f64> {
        Some(self.boundary - 0.5 * self.effect * self.time)
    }

    fn conditional_error(&self, stat: f64) -> f64 {
        exp_probability(-self.effect * (self.boundary - stat))
    }

    fn advance(&self, stat: f64) -> AnalysisState {
        AnalysisState {
            time: self.time,
            stat,
            cond_error: self.conditional_error(stat),
            intercept: self.intercept(),
            boundary: self.boundary,
            working_time: self.time,
            working_stat: stat,
        }
    }
}

impl ConditionalErrorDesign for LocalDesign {
    type Stage = LocalStage;

    fn kind(&self) -> DesignKind {
        DesignKind::Local
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn numerics(&self) -> &NumericsConfig {
        &self.numerics
    }

    fn start(&self, level: f64) -> Result<AnalysisState> {
        check_probability("level", level)?;
        let intercept = self.initial_intercept(level);
        Ok(AnalysisState {
            time: 0.0,
            stat: 0.0,
            cond_error: level,
            intercept: Some(intercept),
            boundary: intercept,
            working_time: 0.0,
            working_stat: 0.0,
        })
    }

    fn solve_stage(&self, prev: &AnalysisState, time: f64, _cost: f64) -> Result<LocalStage> {
        let d = time - prev.time;
        if d.is_nan() || d <= 0.0 {
            return Err(Error::InvalidSchedule(format!(
                "time {time} does not exceed previous time {}",
                prev.time
            )));
        }
        let target = prev.cond_error;
        let cond_xi = -target.ln() / self.effect;
        let upper = INTERCEPT_SEARCH_FACTOR * cond_xi;

        // Q(0) below the target means the look cannot spend it all with a
        // non-negative intercept; spending less keeps the level.
        let xi = if self.stage_probability(0.0, d) <= target {
            tracing::debug!(
                event = event_names::INTERCEPT_SATURATED,
                stage = %Stage::Local,
                time,
                target,
                "intercept clamped at zero"
            );
            0.0
        } else {
            let root = bisect(
                |xi| self.stage_probability(xi, d) - target,
                0.0,
                upper,
                &self.numerics.root_bisection(),
            )
            .map_err(|e| Error::from_root("local_intercept", e))?;
            // Non-positive residual: never spend more than the target.
            root.value
        };

        Ok(LocalStage {
            effect: self.effect,
            time,
            boundary: prev.stat + xi + 0.5 * self.effect * d,
        })
    }

    fn final_intercept(&self, time: f64, boundary: f64) -> Option<f64> {
        Some(boundary - 0.5 * self.effect * time)
    }
}
