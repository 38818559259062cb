//! Composite Simpson quadrature over Brownian-motion states.
//!
//! Integrals in the sequential engines are expectations of a smooth function
//! of a normal variable truncated from above by a stopping boundary:
//!
//! ```text
//! E[f(Z); Z < u],   Z ~ N(mean, var)
//! ```
//!
//! [`expect_below`] evaluates them on a grid spanning `GRID_SPAN` standard
//! deviations around the mean, cut at the boundary. Grid density is expressed
//! as points per standard deviation (`div`).
//!
//! [`Tabulated`] stores a function on a uniform grid and interpolates with
//! four-point Lagrange cubics, so that backward recursions can reuse one
//! level's values at the next. Linear interpolation of a convex tail biases
//! every integral built on it by `O(h^2)`; the cubic stencil is `O(h^4)`.

use super::normal::normal_density;

/// Half-width of every integration grid, in standard deviations.
pub const GRID_SPAN: f64 = 8.0;

/// Points and weights of a composite Simpson rule on `[lower, upper]`.
#[derive(Debug, Clone, Default)]
pub struct SimpsonGrid {
    points: Vec<f64>,
    weights: Vec<f64>,
}

impl SimpsonGrid {
    /// Build a grid whose spacing does not exceed `max_step`.
    ///
    /// The interval count is always even and at least two. An empty or
    /// inverted interval yields an empty grid that integrates to zero.
    pub fn new(lower: f64, upper: f64, max_step: f64) -> Self {
        if !lower.is_finite() || !upper.is_finite() || upper <= lower || max_step.is_nan() || max_step <= 0.0 {
            return Self::default();
        }
        let half_intervals = ((upper - lower) / (2.0 * max_step)).ceil().max(1.0) as usize;
        let n = 2 * half_intervals;
        let step = (upper - lower) / n as f64;
        let mut points = Vec::with_capacity(n + 1);
        let mut weights = Vec::with_capacity(n + 1);
        for i in 0..=n {
            points.push(if i == n { upper } else { lower + i as f64 * step });
            let w = if i == 0 || i == n {
                1.0
            } else if i % 2 == 1 {
                4.0
            } else {
                2.0
            };
            weights.push(w * step / 3.0);
        }
        Self { points, weights }
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Integrate `f` over the grid.
    pub fn integrate<F>(&self, mut f: F) -> f64
    where
        F: FnMut(f64) -> f64,
    {
        self.points
            .iter()
            .zip(&self.weights)
            .map(|(&z, &w)| w * f(z))
            .sum()
    }
}

/// Simpson grid covering N(mean, sd^2) and truncated at `upper`.
pub fn normal_grid(mean: f64, sd: f64, upper: f64, div: usize) -> SimpsonGrid {
    let lower = mean - GRID_SPAN * sd;
    let top = upper.min(mean + GRID_SPAN * sd);
    SimpsonGrid::new(lower, top, sd / div.max(1) as f64)
}

/// `E[f(Z); Z < upper]` for `Z ~ N(mean, var)`.
///
/// Mass beyond `GRID_SPAN` standard deviations is ignored.
pub fn expect_below<F>(mean: f64, var: f64, upper: f64, div: usize, mut f: F) -> f64
where
    F: FnMut(f64) -> f64,
{
    if var.is_nan() || var <= 0.0 {
        return if mean < upper { f(mean) } else { 0.0 };
    }
    let sd = var.sqrt();
    normal_grid(mean, sd, upper, div).integrate(|z| f(z) * normal_density(z, mean, var))
}

/// Behavior of a [`Tabulated`] function below its first grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extrapolate {
    /// Return a fixed value.
    Constant(f64),
    /// Repeat the value at the nearest grid point.
    Edge,
}

/// A function sampled on a uniform grid with cubic interpolation.
///
/// Interpolants are clamped to the range of their four stencil values, so a
/// monotone table stays monotone between nodes and never leaves the sampled
/// range. Tables with fewer than four points fall back to linear
/// interpolation. Above the last grid point the last value is repeated.
#[derive(Debug, Clone)]
pub struct Tabulated {
    lower: f64,
    step: f64,
    values: Vec<f64>,
    below: Extrapolate,
}

impl Tabulated {
    /// Sample `f` on `[lower, upper]` with spacing at most `max_step`.
    pub fn build<F>(lower: f64, upper: f64, max_step: f64, below: Extrapolate, mut f: F) -> Self
    where
        F: FnMut(f64) -> f64,
    {
        if upper.is_nan() || upper <= lower || max_step.is_nan() || max_step <= 0.0 {
            return Self {
                lower,
                step: 0.0,
                values: vec![f(lower)],
                below,
            };
        }
        let n = ((upper - lower) / max_step).ceil().max(1.0) as usize;
        let step = (upper - lower) / n as f64;
        let values = (0..=n).map(|i| f(lower + i as f64 * step)).collect();
        Self {
            lower,
            step,
            values,
            below,
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.lower + self.step * (self.values.len() - 1) as f64
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Interpolated value at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        if x < self.lower {
            return match self.below {
                Extrapolate::Constant(v) => v,
                Extrapolate::Edge => self.values[0],
            };
        }
        let last = self.values.len() - 1;
        if last == 0 || self.step <= 0.0 {
            return self.values[0];
        }
        let pos = (x - self.lower) / self.step;
        if pos >= last as f64 {
            return self.values[last];
        }
        let i = pos.floor() as usize;
        if last < 3 {
            let frac = pos - i as f64;
            return self.values[i] * (1.0 - frac) + self.values[i + 1] * frac;
        }
        // Stencil i-1..=i+2, shifted inward at either end of the table.
        let k = i.saturating_sub(1).min(last - 3);
        let t = pos - k as f64;
        let v = &self.values[k..k + 4];
        let cubic = -v[0] * (t - 1.0) * (t - 2.0) * (t - 3.0) / 6.0
            + v[1] * t * (t - 2.0) * (t - 3.0) / 2.0
            - v[2] * t * (t - 1.0) * (t - 3.0) / 2.0
            + v[3] * t * (t - 1.0) * (t - 2.0) / 6.0;
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        cubic.clamp(lo, hi)
    }
}
