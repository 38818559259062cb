//! Working test for the global design.
//!
//! The working test is a group-sequential test over a basic schedule
//! `s_i = s_max (i/m)^p`, `i = 1..m`, whose boundaries minimize a Bayes loss
//! under the design alternative `rho`:
//!
//! - each unit of information costs 1,
//! - rejecting at `s_j` with statistic `x` costs `c1 exp(-rho x + rho^2 s_j / 2)`
//!   (the Type I loss expressed through the likelihood ratio),
//! - accepting at the last analysis costs `c2`.
//!
//! Backward induction gives, at every analysis, the point `u_j` where stopping
//! loss equals expected continuation loss. Each `u_j` is found by bisection;
//! the continuation loss is a Simpson integral of the next analysis's value
//! function, stored as an interpolation table.
//!
//! Once the boundaries are known, a second backward pass tabulates the null
//! probability of eventual rejection, `C_j(z)`, from which the conditional
//! error at any intermediate state `(sigma, y)` follows by one more integral
//! (see [`WorkingTest::conditional_error`]).
//!
//! The size of the test is the sum of its per-analysis null spending, obtained
//! by propagating the null sub-density forward through the boundaries. With
//! `cost_type_1_err = 0` the loss `c1` is calibrated by bisection on `ln c1`
//! until that sum equals `alpha` within `tol_cost`.

use serde::{Deserialize, Serialize};
use seq_common::{Error, Result};
use seq_math::{
    bisect, clamp_probability, expect_below, normal_density, normal_log_sf, normal_sf,
    normal_upper_quantile, BisectionConfig, Extrapolate, SimpsonGrid, Tabulated,
};

use super::{check_effect, check_probability};
use crate::config::NumericsConfig;
use crate::logging::{event_names, Stage};

/// Value tables reach this many remaining-information standard deviations below a boundary.
const TABLE_DEPTH: f64 = 10.0;
/// Sub-densities are truncated this many standard deviations below their mean.
const DENSITY_DEPTH: f64 = 8.0;
/// Calibration searches `ln c1` on `[ln c2 - 10, ln c2 + 30]`.
const CALIBRATION_BELOW: f64 = 10.0;
const CALIBRATION_ABOVE: f64 = 30.0;
/// Calibration converges on the alpha residual, not on `ln c1`.
const CALIBRATION_X_TOL: f64 = 1e-12;

/// Inputs of the working-test construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkingTestSpec {
    pub alpha: f64,
    pub work_beta: f64,
    pub effect: f64,
    /// Loss of a Type I error; `0` calibrates it to realize `alpha` exactly.
    pub cost_type_1_err: f64,
    /// Loss of accepting at the last analysis; defaults to the fixed-sample information.
    pub cost_type_2_err: Option<f64>,
}

impl WorkingTestSpec {
    pub fn new(alpha: f64, work_beta: f64, effect: f64) -> Self {
        Self {
            alpha,
            work_beta,
            effect,
            cost_type_1_err: 0.0,
            cost_type_2_err: None,
        }
    }

    pub fn with_cost_type_1_err(mut self, cost: f64) -> Self {
        self.cost_type_1_err = cost;
        self
    }

    pub fn with_cost_type_2_err(mut self, cost: f64) -> Self {
        self.cost_type_2_err = Some(cost);
        self
    }

    fn validate(&self) -> Result<()> {
        check_probability("alpha", self.alpha)?;
        check_probability("work_beta", self.work_beta)?;
        check_effect("effect", self.effect)?;
        if !self.cost_type_1_err.is_finite() || self.cost_type_1_err < 0.0 {
            return Err(Error::invalid(
                "cost_type_1_err",
                format!("must be 0 (calibrate) or positive, got {}", self.cost_type_1_err),
            ));
        }
        if let Some(c2) = self.cost_type_2_err {
            if !c2.is_finite() || c2 <= 0.0 {
                return Err(Error::invalid(
                    "cost_type_2_err",
                    format!("must be positive, got {c2}"),
                ));
            }
        }
        Ok(())
    }
}

/// Information a single-look test needs for size `alpha` and power `1 - beta` at drift `effect`.
pub fn fixed_sample_information(alpha: f64, beta: f64, effect: f64) -> f64 {
    let z = normal_upper_quantile(alpha) + normal_upper_quantile(beta);
    (z / effect).powi(2)
}

/// Power-law basic schedule ending at `horizon`.
pub fn basic_schedule(horizon: f64, analyses: usize, power: f64) -> Vec<f64> {
    (1..=analyses)
        .map(|i| horizon * (i as f64 / analyses as f64).powf(power))
        .collect()
}

/// An immutable working test. Build once per trial and share by reference.
#[derive(Debug, Clone, Serialize)]
pub struct WorkingTest {
    alpha: f64,
    work_beta: f64,
    effect: f64,
    cost_type_1_err: f64,
    cost_type_2_err: f64,
    calibrated: bool,
    fixed_sample_information: f64,
    schedule: Vec<f64>,
    boundaries: Vec<f64>,
    /// Null rejection probability at each analysis.
    null_spending: Vec<f64>,
    /// Null probability of eventual rejection, the sum of `null_spending`.
    size: f64,
    /// Rejection probability under the design alternative.
    power: f64,
    #[serde(skip)]
    null_tables: Vec<Tabulated>,
    #[serde(skip)]
    simpson_div: usize,
}

impl WorkingTest {
    /// Construct the working test, calibrating `c1` when requested.
    pub fn build(spec: &WorkingTestSpec, numerics: &NumericsConfig) -> Result<Self> {
        spec.validate()?;
        let n_fix = fixed_sample_information(spec.alpha, spec.work_beta, spec.effect);
        let schedule = basic_schedule(
            numerics.horizon_factor * n_fix,
            numerics.basic_schedule_num,
            numerics.schedule_power,
        );
        let c2 = spec.cost_type_2_err.unwrap_or(n_fix);
        let model = LossModel {
            effect: spec.effect,
            c2,
            schedule: &schedule,
            div: numerics.simpson_div,
            bisection: numerics.boundary_bisection(),
        };

        let calibrated = spec.cost_type_1_err == 0.0;
        let ln_c1 = if calibrated {
            model.calibrate(spec.alpha, numerics)?
        } else {
            spec.cost_type_1_err.ln()
        };

        let boundaries = model.boundaries(ln_c1)?;
        let null_tables = null_tables(&schedule, &boundaries, numerics.simpson_div);
        let null_spending = rejection_profile(&schedule, &boundaries, 0.0, numerics.simpson_div);
        let size = null_spending.iter().sum::<f64>();
        let power = rejection_profile(&schedule, &boundaries, spec.effect, numerics.simpson_div)
            .iter()
            .sum::<f64>();

        tracing::debug!(
            event = event_names::WORKING_TEST_BUILT,
            stage = %Stage::Build,
            analyses = schedule.len(),
            horizon = schedule[schedule.len() - 1],
            cost_type_1_err = ln_c1.exp(),
            cost_type_2_err = c2,
            size,
            power,
            "working test built"
        );

        Ok(Self {
            alpha: spec.alpha,
            work_beta: spec.work_beta,
            effect: spec.effect,
            cost_type_1_err: ln_c1.exp(),
            cost_type_2_err: c2,
            calibrated,
            fixed_sample_information: n_fix,
            schedule,
            boundaries,
            null_spending,
            size,
            power,
            null_tables,
            simpson_div: numerics.simpson_div,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn work_beta(&self) -> f64 {
        self.work_beta
    }

    pub fn effect(&self) -> f64 {
        self.effect
    }

    pub fn cost_type_1_err(&self) -> f64 {
        self.cost_type_1_err
    }

    pub fn cost_type_2_err(&self) -> f64 {
        self.cost_type_2_err
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn fixed_sample_information(&self) -> f64 {
        self.fixed_sample_information
    }

    pub fn schedule(&self) -> &[f64] {
        &self.schedule
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn null_spending(&self) -> &[f64] {
        &self.null_spending
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    /// Last analysis of the basic schedule.
    pub fn horizon(&self) -> f64 {
        self.schedule[self.schedule.len() - 1]
    }

    /// Null probability that the working test rejects, given it is at `y` at time `sigma`.
    ///
    /// Analyses at or before `sigma` are treated as passed, except that a state
    /// sitting exactly on an analysis at or above its boundary has rejected.
    pub fn conditional_error(&self, sigma: f64, y: f64) -> f64 {
        conditional_error_on(
            &self.schedule,
            &self.boundaries,
            &self.null_tables,
            self.simpson_div,
            sigma,
            y,
        )
    }
}

/// Loss structure of the backward induction.
struct LossModel<'a> {
    effect: f64,
    c2: f64,
    schedule: &'a [f64],
    div: usize,
    bisection: BisectionConfig,
}

impl LossModel<'_> {
    /// `ln` of the loss of rejecting at analysis `j` with statistic `z`.
    fn ln_stop_loss(&self, ln_c1: f64, j: usize, z: f64) -> f64 {
        let rho = self.effect;
        ln_c1 - rho * z + 0.5 * rho * rho * self.schedule[j]
    }

    /// Boundaries `u_j` by backward induction.
    fn boundaries(&self, ln_c1: f64) -> Result<Vec<f64>> {
        let s = self.schedule;
        let m = s.len();
        let rho = self.effect;
        let c2 = self.c2;
        let s_max = s[m - 1];

        let mut u = vec![0.0; m];
        u[m - 1] = (ln_c1 - c2.ln() + 0.5 * rho * rho * s_max) / rho;

        // Value function of analysis j + 1 below its boundary; None means "accept, pay c2".
        let mut next_value: Option<Tabulated> = None;
        for j in (0..m - 1).rev() {
            let d = s[j + 1] - s[j];
            let sd = d.sqrt();
            let u_next = u[j + 1];
            let ln_above = ln_c1 + 0.5 * rho * rho * s[j + 1] + 0.5 * rho * rho * d;
            let value_table = next_value.as_ref();
            let continuation = |z: f64| -> f64 {
                let mean = z + rho * d;
                let below = expect_below(mean, d, u_next, self.div, |w| {
                    value_table.map_or(c2, |t| t.eval(w))
                });
                let above = loss_above(ln_above - rho * mean, (u_next - mean + rho * d) / sd);
                d + below + above
            };

            let max_loss = (s_max - s[j]) + c2;
            let lower = (ln_c1 - max_loss.ln() + 0.5 * rho * rho * s[j]) / rho;
            let upper = (ln_c1 - d.ln() + 0.5 * rho * rho * s[j]) / rho;
            let root = bisect(
                |z| continuation(z) - self.ln_stop_loss(ln_c1, j, z).exp(),
                lower,
                upper,
                &self.bisection,
            )
            .map_err(|e| Error::from_root("working_boundary", e))?;
            u[j] = root.value;

            if j > 0 {
                let step = increment_sd(s, j).min(sd) / self.div as f64;
                let table_lower = u[j] - TABLE_DEPTH * (s_max - s[j]).sqrt();
                let table = Tabulated::build(table_lower, u[j], step, Extrapolate::Edge, continuation);
                next_value = Some(table);
            }
        }
        Ok(u)
    }

    /// Null size of the test built with loss `exp(ln_c1)`.
    fn size(&self, ln_c1: f64) -> Result<f64> {
        let u = self.boundaries(ln_c1)?;
        Ok(rejection_profile(self.schedule, &u, 0.0, self.div).iter().sum())
    }

    /// `ln c1` such that the null size equals `alpha` within `tol_cost`.
    fn calibrate(&self, alpha: f64, numerics: &NumericsConfig) -> Result<f64> {
        let ln_c2 = self.c2.ln();
        let config = BisectionConfig::new(CALIBRATION_X_TOL, numerics.max_iter).with_f_tol(numerics.tol_cost);
        let mut failure: Option<Error> = None;
        let result = bisect(
            |ln_c1| match self.size(ln_c1) {
                Ok(size) => size - alpha,
                Err(e) => {
                    failure.get_or_insert(e);
                    f64::NAN
                }
            },
            ln_c2 - CALIBRATION_BELOW,
            ln_c2 + CALIBRATION_ABOVE,
            &config,
        );
        if let Some(e) = failure {
            return Err(e);
        }
        let root = result.map_err(|e| Error::from_root("cost_calibration", e))?;
        tracing::debug!(
            event = event_names::COST_CALIBRATED,
            stage = %Stage::Build,
            cost_type_1_err = root.value.exp(),
            residual = root.residual,
            iterations = root.iterations,
            "type I loss calibrated"
        );
        Ok(root.value)
    }
}

/// `exp(ln_scale) * P(Z >= z)`, combined in log space so that a huge scale
/// against a vanishing tail stays finite.
fn loss_above(ln_scale: f64, z: f64) -> f64 {
    (ln_scale + normal_log_sf(z)).exp()
}

/// Standard deviation of the increment into analysis `j`.
fn increment_sd(s: &[f64], j: usize) -> f64 {
    if j == 0 {
        s[0].sqrt()
    } else {
        (s[j] - s[j - 1]).sqrt()
    }
}

/// Null rejection-probability tables `C_j`, `j < m - 1`, indexed by analysis.
fn null_tables(s: &[f64], u: &[f64], div: usize) -> Vec<Tabulated> {
    let m = s.len();
    let s_max = s[m - 1];
    let mut tables: Vec<Tabulated> = Vec::with_capacity(m.saturating_sub(1));
    for j in (0..m.saturating_sub(1)).rev() {
        let d = s[j + 1] - s[j];
        let sd = d.sqrt();
        let u_next = u[j + 1];
        // tables holds C_{m-2}, ..., C_{j+1} in that order.
        let next = tables.last();
        let crossing = |z: f64| -> f64 {
            let later = next.map_or(0.0, |t| expect_below(z, d, u_next, div, |w| t.eval(w)));
            normal_sf((u_next - z) / sd) + later
        };
        let lowest = u[j..].iter().copied().fold(f64::INFINITY, f64::min);
        let lower = lowest - TABLE_DEPTH * (s_max - s[j]).sqrt();
        let step = increment_sd(s, j).min(sd) / div as f64;
        let table = Tabulated::build(lower, u[j], step, Extrapolate::Constant(0.0), crossing);
        tables.push(table);
    }
    tables.reverse();
    tables
}

fn conditional_error_on(
    s: &[f64],
    u: &[f64],
    tables: &[Tabulated],
    div: usize,
    sigma: f64,
    y: f64,
) -> f64 {
    let j = s.partition_point(|&sj| sj <= sigma);
    if j > 0 && s[j - 1] == sigma && y >= u[j - 1] {
        return 1.0;
    }
    if j == s.len() {
        return 0.0;
    }
    let var = s[j] - sigma;
    let crossing = normal_sf((u[j] - y) / var.sqrt());
    let later = tables
        .get(j)
        .map_or(0.0, |t| expect_below(y, var, u[j], div, |w| t.eval(w)));
    clamp_probability(crossing + later)
}

/// Rejection probability at each analysis when the drift is `drift`.
///
/// Propagates the sub-density of paths that have not stopped on a Simpson
/// grid below each boundary.
fn rejection_profile(s: &[f64], u: &[f64], drift: f64, div: usize) -> Vec<f64> {
    let m = s.len();
    let mut profile = Vec::with_capacity(m);
    let first_sd = s[0].sqrt();
    profile.push(normal_sf((u[0] - drift * s[0]) / first_sd));
    if m == 1 {
        return profile;
    }

    let density_grid = |j: usize| -> SimpsonGrid {
        let step = increment_sd(s, j).min(increment_sd(s, j + 1)) / div as f64;
        let lower = drift * s[j] - DENSITY_DEPTH * s[j].sqrt();
        SimpsonGrid::new(lower, u[j], step)
    };

    let mut grid = density_grid(0);
    let mut density: Vec<f64> = grid
        .points()
        .iter()
        .map(|&z| normal_density(z, drift * s[0], s[0]))
        .collect();

    for j in 1..m {
        let d = s[j] - s[j - 1];
        let sd = d.sqrt();
        let mass: Vec<f64> = grid
            .weights()
            .iter()
            .zip(&density)
            .map(|(w, f)| w * f)
            .collect();

        let rejected: f64 = grid
            .points()
            .iter()
            .zip(&mass)
            .map(|(&z, &p)| p * normal_sf((u[j] - z - drift * d) / sd))
            .sum();
        profile.push(rejected);
        if j == m - 1 {
            break;
        }

        let next_grid = density_grid(j);
        density = next_grid
            .points()
            .iter()
            .map(|&w| {
                grid.points()
                    .iter()
                    .zip(&mass)
                    .map(|(&z, &p)| p * normal_density(w, z + drift * d, d))
                    .sum::<f64>()
            })
            .collect();
        grid = next_grid;
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numerics() -> NumericsConfig {
        NumericsConfig {
            simpson_div: 4,
            basic_schedule_num: 5,
            ..NumericsConfig::default()
        }
    }

    fn spec() -> WorkingTestSpec {
        WorkingTestSpec::new(0.025, 0.2, -(0.65f64).ln())
    }

    #[test]
    fn fixed_sample_information_matches_textbook() {
        // (1.96 + 0.8416)^2 / 0.25^2
        let n = fixed_sample_information(0.025, 0.2, 0.5);
        assert!((n - 31.396).abs() < 1e-2, "n = {n}");
    }

    #[test]
    fn schedule_is_power_law() {
        let s = basic_schedule(100.0, 4, 2.0);
        assert_eq!(s, vec![6.25, 25.0, 56.25, 100.0]);
    }

    #[test]
    fn calibrated_size_matches_alpha() {
        let test = WorkingTest::build(&spec(), &numerics()).unwrap();
        assert!(test.is_calibrated());
        assert!((test.size() - 0.025).abs() <= 1e-5, "size = {}", test.size());
        assert!(test.size() <= 0.025 + 1e-12);
    }

    #[test]
    fn null_spending_sums_to_alpha_within_cost_tolerance() {
        let numerics = numerics();
        let test = WorkingTest::build(&spec(), &numerics).unwrap();
        let spent: f64 = test.null_spending().iter().sum();
        assert!((spent - 0.025).abs() <= numerics.tol_cost, "spent {spent}");
        assert!((spent - test.size()).abs() < 1e-12);
        assert!(test.null_spending().iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn default_numerics_spend_alpha_within_cost_tolerance() {
        let numerics = NumericsConfig::default();
        let test = WorkingTest::build(&spec(), &numerics).unwrap();
        let spent: f64 = test.null_spending().iter().sum();
        assert!((spent - 0.025).abs() <= numerics.tol_cost, "spent {spent}");
    }

    #[test]
    fn conditional_error_at_origin_agrees_with_forward_spending() {
        // Backward tables and forward density must describe the same test.
        let numerics = NumericsConfig::default();
        let test =
            WorkingTest::build(&spec().with_cost_type_1_err(400.0), &numerics).unwrap();
        let backward = test.conditional_error(0.0, 0.0);
        assert!(
            (backward - test.size()).abs() <= numerics.tol_cost,
            "backward {backward} forward {}",
            test.size()
        );
    }

    #[test]
    fn loss_above_is_finite_for_extreme_states() {
        // exp(1210) overflows and the tail underflows; the product would be inf * 0.
        let v = loss_above(1210.0, 90.0);
        assert!(v.is_finite() && v >= 0.0, "v = {v}");
        assert!(v < 1e-300);

        let moderate = loss_above(0.7, 1.5);
        assert!((moderate - 0.7f64.exp() * normal_sf(1.5)).abs() < 1e-12);
    }

    #[test]
    fn power_exceeds_size() {
        let test = WorkingTest::build(&spec(), &numerics()).unwrap();
        assert!(test.power() > 0.5, "power = {}", test.power());
        assert!(test.power() < 1.0);
    }

    #[test]
    fn boundaries_are_finite_and_schedule_increasing() {
        let test = WorkingTest::build(&spec(), &numerics()).unwrap();
        assert_eq!(test.boundaries().len(), 5);
        assert!(test.boundaries().iter().all(|u| u.is_finite()));
        assert!(test.schedule().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn conditional_error_is_monotone_and_bounded() {
        let test = WorkingTest::build(&spec(), &numerics()).unwrap();
        let sigma = 0.5 * test.horizon();
        let mut last = 0.0;
        for i in 0..40 {
            let y = -4.0 + 0.5 * i as f64;
            let ce = test.conditional_error(sigma, y);
            assert!((0.0..=1.0).contains(&ce));
            assert!(ce >= last - 1e-6, "y={y}: {ce} < {last}");
            last = ce;
        }
    }

    #[test]
    fn conditional_error_past_horizon_is_zero() {
        let test = WorkingTest::build(&spec(), &numerics()).unwrap();
        assert_eq!(test.conditional_error(test.horizon() + 1.0, 100.0), 0.0);
        let last = test.boundaries()[4];
        assert_eq!(test.conditional_error(test.horizon(), last + 0.1), 1.0);
    }

    #[test]
    fn explicit_costs_skip_calibration() {
        let spec = spec().with_cost_type_1_err(500.0).with_cost_type_2_err(20.0);
        let test = WorkingTest::build(&spec, &numerics()).unwrap();
        assert!(!test.is_calibrated());
        assert_eq!(test.cost_type_1_err(), 500.0);
        assert_eq!(test.cost_type_2_err(), 20.0);
    }

    #[test]
    fn larger_type_one_loss_lowers_size() {
        let cheap = WorkingTest::build(&spec().with_cost_type_1_err(50.0), &numerics()).unwrap();
        let dear = WorkingTest::build(&spec().with_cost_type_1_err(5000.0), &numerics()).unwrap();
        assert!(dear.size() < cheap.size());
    }

    #[test]
    fn rejects_invalid_spec() {
        assert!(WorkingTest::build(&WorkingTestSpec::new(0.025, 1.2, 0.4), &numerics()).is_err());
        assert!(WorkingTest::build(&spec().with_cost_type_1_err(-1.0), &numerics()).is_err());
    }

    #[test]
    fn single_analysis_working_test() {
        let numerics = NumericsConfig {
            basic_schedule_num: 1,
            ..numerics()
        };
        let test = WorkingTest::build(&spec(), &numerics).unwrap();
        assert_eq!(test.schedule().len(), 1);
        assert!((test.size() - 0.025).abs() <= 1e-5);
    }
}
