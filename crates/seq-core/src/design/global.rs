//! Global design: actual analyses mapped onto a precomputed working test.
//!
//! Every actual analysis `k` carries a working-clock time `sigma_k` (its
//! "cost"). Between two analyses the observed increment is rescaled to the
//! working clock,
//!
//! ```text
//! Y_k = Y_{k-1} + (x_k - x_{k-1}) sqrt((sigma_k - sigma_{k-1}) / (t_k - t_{k-1}))
//! ```
//!
//! and the boundary `b'` on the working scale solves
//!
//! ```text
//! P0(Y_k >= b') + E0[CE_W(sigma_k, Y_k); Y_k < b'] = alpha_{k-1}
//! ```
//!
//! The left side decreases in `b'` towards `CE_W(sigma_{k-1}, Y_{k-1})`. When no
//! working analysis lies between the two actual ones that limit equals the
//! leftover error, so the equation has no finite root. The boundary is then the
//! smallest `b'` whose spending is within `tol_boundary` of the limit.
//!
//! Beyond the working horizon `CE_W` vanishes and the boundary is the exact
//! normal quantile.

use serde::Serialize;
use seq_common::{Error, Result};
use seq_math::{bisect, expect_below, normal_sf, normal_upper_quantile, Extrapolate, Tabulated};

use super::{
    analyze, check_probability, AnalysisOptions, AnalysisReport, AnalysisState,
    ConditionalErrorDesign, DesignKind, DesignParameters, History, StageSolution, WorkingTest,
};
use crate::config::NumericsConfig;
use crate::logging::{event_names, Stage};

/// Half-width of the stage conditional-error table, in increment standard deviations.
const TABLE_SPAN: f64 = 8.0;
/// Boundary search reaches this many increment standard deviations above the closed form.
const BOUNDARY_SEARCH_SPAN: f64 = 12.0;
/// Start-point search reaches this many horizon standard deviations past the boundaries.
const START_SEARCH_SPAN: f64 = 12.0;

/// Conditional-error design driven by a [`WorkingTest`].
#[derive(Debug, Clone, Serialize)]
pub struct GlobalDesign<'w> {
    working: &'w WorkingTest,
    #[serde(skip)]
    numerics: NumericsConfig,
}

impl<'w> GlobalDesign<'w> {
    pub fn new(working: &'w WorkingTest, numerics: NumericsConfig) -> Self {
        Self { working, numerics }
    }

    pub fn working_test(&self) -> &'w WorkingTest {
        self.working
    }

    pub fn parameters(&self) -> DesignParameters {
        DesignParameters::Global {
            alpha: self.working.alpha(),
            work_beta: self.working.work_beta(),
            effect: self.working.effect(),
            cost_type_1_err: self.working.cost_type_1_err(),
            cost_type_2_err: self.working.cost_type_2_err(),
        }
    }

    /// Evaluate every analysis; `costs` default to `times`.
    pub fn analyze(
        &self,
        times: &[f64],
        stats: &[f64],
        costs: Option<&[f64]>,
        options: AnalysisOptions,
    ) -> Result<AnalysisReport> {
        let history = History::with_costs(times, stats, costs)?;
        analyze(self, self.parameters(), &history, options)
    }
}

/// A solved global-design look.
#[derive(Debug, Clone)]
pub struct GlobalStage<'w> {
    working: &'w WorkingTest,
    time: f64,
    cost: f64,
    prev_stat: f64,
    prev_working_stat: f64,
    /// `sqrt(d_sigma / d_t)`: statistic increments to working increments.
    scale: f64,
    working_boundary: f64,
    boundary: f64,
    /// `CE_W(cost, .)` on the range the next integrals reach; `None` past the horizon.
    table: Option<Tabulated>,
}

impl GlobalStage<'_> {
    pub fn working_boundary(&self) -> f64 {
        self.working_boundary
    }

    fn working_stat(&self, stat: f64) -> f64 {
        self.prev_working_stat + (stat - self.prev_stat) * self.scale
    }
}

impl StageSolution for GlobalStage<'_> {
    fn boundary(&self) -> f64 {
        self.boundary
    }

    fn conditional_error(&self, stat: f64) -> f64 {
        let y = self.working_stat(stat);
        if y >= self.working_boundary {
            1.0
        } else {
            self.working.conditional_error(self.cost, y)
        }
    }

    fn approx_conditional_error(&self, stat: f64) -> f64 {
        let y = self.working_stat(stat);
        if y >= self.working_boundary {
            return 1.0;
        }
        match &self.table {
            Some(table) => table.eval(y),
            None => self.working.conditional_error(self.cost, y),
        }
    }

    fn advance(&self, stat: f64) -> AnalysisState {
        AnalysisState {
            time: self.time,
            stat,
            cond_error: self.conditional_error(stat),
            intercept: None,
            boundary: self.boundary,
            working_time: self.cost,
            working_stat: self.working_stat(stat),
        }
    }
}

impl<'w> ConditionalErrorDesign for GlobalDesign<'w> {
    type Stage = GlobalStage<'w>;

    fn kind(&self) -> DesignKind {
        DesignKind::Global
    }

    fn alpha(&self) -> f64 {
        self.working.alpha()
    }

    fn numerics(&self) -> &NumericsConfig {
        &self.numerics
    }

    /// Working statistic at time 0 whose conditional error equals `level`.
    ///
    /// At `level == alpha` this is 0 up to the calibration tolerance.
    fn start(&self, level: f64) -> Result<AnalysisState> {
        check_probability("level", level)?;
        let w = self.working;
        let spread = START_SEARCH_SPAN * w.horizon().sqrt();
        let lowest = w.boundaries().iter().copied().fold(f64::INFINITY, f64::min);
        let highest = w.boundaries().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let root = bisect(
            |y| w.conditional_error(0.0, y) - level,
            lowest - spread,
            highest + spread,
            &self.numerics.root_bisection(),
        )
        .map_err(|e| Error::from_root("global_start", e))?;
        Ok(AnalysisState {
            time: 0.0,
            stat: 0.0,
            cond_error: level,
            intercept: None,
            boundary: f64::INFINITY,
            working_time: 0.0,
            working_stat: root.value,
        })
    }

    fn solve_stage(&self, prev: &AnalysisState, time: f64, cost: f64) -> Result<GlobalStage<'w>> {
        let dt = time - prev.time;
        let ds = cost - prev.working_time;
        if dt.is_nan() || dt <= 0.0 {
            return Err(Error::InvalidSchedule(format!(
                "time {time} does not exceed previous time {}",
                prev.time
            )));
        }
        if ds.is_nan() || ds <= 0.0 {
            return Err(Error::InvalidSchedule(format!(
                "cost {cost} does not exceed previous cost {}",
                prev.working_time
            )));
        }

        let w = self.working;
        let div = self.numerics.simpson_div;
        let target = prev.cond_error;
        let y = prev.working_stat;
        let sd = ds.sqrt();
        let closed_form = y + normal_upper_quantile(target) * sd;

        let (working_boundary, table) = if cost > w.horizon() {
            (closed_form, None)
        } else {
            let upper = (y + TABLE_SPAN * sd).max(closed_form + BOUNDARY_SEARCH_SPAN * sd);
            let table = Tabulated::build(
                y - TABLE_SPAN * sd,
                upper,
                sd / div as f64,
                Extrapolate::Constant(0.0),
                |v| w.conditional_error(cost, v),
            );
            let spent = |b: f64| normal_sf((b - y) / sd) + expect_below(y, ds, b, div, |v| table.eval(v));
            let top = closed_form + BOUNDARY_SEARCH_SPAN * sd;
            let ceiling = spent(top);
            let level = if ceiling >= target {
                tracing::debug!(
                    event = event_names::BOUNDARY_UNBOUNDED,
                    stage = %Stage::Global,
                    time,
                    cost,
                    target,
                    ceiling,
                    "no finite working boundary, settling within tolerance of the limit"
                );
                ceiling + self.numerics.tol_boundary
            } else {
                target
            };
            let boundary = if spent(closed_form) <= level {
                closed_form
            } else {
                bisect(
                    |b| spent(b) - level,
                    closed_form,
                    top,
                    &self.numerics.boundary_bisection(),
                )
                .map_err(|e| Error::from_root("global_boundary", e))?
                .value
            };
            (boundary, Some(table))
        };

        let scale = (ds / dt).sqrt();
        Ok(GlobalStage {
            working: w,
            time,
            cost,
            prev_stat: prev.stat,
            prev_working_stat: y,
            scale,
            working_boundary,
            boundary: prev.stat + (working_boundary - y) / scale,
            table,
        })
    }
}
