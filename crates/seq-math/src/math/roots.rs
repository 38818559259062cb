//! Bounded bisection with an explicit convergence report.
//!
//! Every implicit equation in the sequential engines (boundary intercepts,
//! working-test boundaries, cost calibration, sample-size and estimate
//! searches) is solved through [`bisect`]. The solver never loops unboundedly
//! and never returns silently on exhaustion: callers get either a [`Root`] or a
//! [`RootError`] that still carries the last iterate.
//!
//! # Sign convention
//!
//! The returned value is always the bracket end whose objective is
//! non-positive. Callers orient their objective so that the non-positive side
//! is the conservative one (for example `achieved_alpha - target`).

use serde::Serialize;
use thiserror::Error;

/// Tolerances and iteration cap for a bisection search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BisectionConfig {
    /// Stop once the half-width of the bracket is at most this.
    pub x_tol: f64,
    /// When set, convergence additionally requires `|f(root)| <= f_tol`.
    pub f_tol: Option<f64>,
    /// Hard cap on the number of halvings.
    pub max_iter: usize,
}

impl BisectionConfig {
    pub fn new(x_tol: f64, max_iter: usize) -> Self {
        Self {
            x_tol,
            f_tol: None,
            max_iter,
        }
    }

    pub fn with_f_tol(mut self, f_tol: f64) -> Self {
        self.f_tol = Some(f_tol);
        self
    }

    /// Iterations needed to shrink `width` down to the x tolerance, capped at `max_iter`.
    pub fn iterations_for(&self, width: f64) -> usize {
        if width.is_nan() || width <= 0.0 || self.x_tol.is_nan() || self.x_tol <= 0.0 {
            return 0;
        }
        let needed = (width / (2.0 * self.x_tol)).log2().ceil().max(0.0) as usize + 1;
        needed.min(self.max_iter)
    }
}

impl Default for BisectionConfig {
    fn default() -> Self {
        Self::new(1e-8, 200)
    }
}

/// A converged bisection result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Root {
    /// Bracket end with non-positive objective.
    pub value: f64,
    /// Objective at `value`.
    pub residual: f64,
    /// Final bracket half-width.
    pub half_width: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RootError {
    #[error("no sign change on [{lower}, {upper}] (f = {f_lower:e}, {f_upper:e})")]
    NotBracketed {
        lower: f64,
        upper: f64,
        f_lower: f64,
        f_upper: f64,
    },
    #[error("not converged after {iterations} iterations (last iterate {last_iterate}, residual {residual:e})")]
    NotConverged {
        iterations: usize,
        last_iterate: f64,
        residual: f64,
    },
    #[error("objective is NaN at {at}")]
    NanObjective { at: f64 },
}

impl RootError {
    /// Best iterate available when the search failed, if any.
    pub fn last_iterate(&self) -> Option<f64> {
        match self {
            RootError::NotConverged { last_iterate, .. } => Some(*last_iterate),
            _ => None,
        }
    }
}

/// Find a sign change of `f` on `[lower, upper]` by bisection.
///
/// `f` may be increasing or decreasing; only the signs at the ends matter.
/// An exact zero at either end is returned immediately.
pub fn bisect<F>(mut f: F, lower: f64, upper: f64, config: &BisectionConfig) -> Result<Root, RootError>
where
    F: FnMut(f64) -> f64,
{
    let (mut lo, mut hi) = if lower <= upper {
        (lower, upper)
    } else {
        (upper, lower)
    };
    let mut f_lo = f(lo);
    if f_lo.is_nan() {
        return Err(RootError::NanObjective { at: lo });
    }
    let mut f_hi = f(hi);
    if f_hi.is_nan() {
        return Err(RootError::NanObjective { at: hi });
    }

    if f_lo == 0.0 {
        return Ok(Root {
            value: lo,
            residual: 0.0,
            half_width: 0.5 * (hi - lo),
            iterations: 0,
        });
    }
    if f_hi == 0.0 {
        return Ok(Root {
            value: hi,
            residual: 0.0,
            half_width: 0.5 * (hi - lo),
            iterations: 0,
        });
    }
    if f_lo.signum() == f_hi.signum() {
        return Err(RootError::NotBracketed {
            lower: lo,
            upper: hi,
            f_lower: f_lo,
            f_upper: f_hi,
        });
    }

    let mut iterations = 0;
    loop {
        let (value, residual) = if f_lo <= 0.0 { (lo, f_lo) } else { (hi, f_hi) };
        let half_width = 0.5 * (hi - lo);
        let width_ok = half_width <= config.x_tol;
        let residual_ok = config.f_tol.map_or(true, |tol| residual.abs() <= tol);
        if residual_ok && (width_ok || config.f_tol.is_some()) {
            return Ok(Root {
                value,
                residual,
                half_width,
                iterations,
            });
        }
        if iterations >= config.max_iter || (width_ok && !residual_ok) {
            return Err(RootError::NotConverged {
                iterations,
                last_iterate: value,
                residual,
            });
        }

        let mid = lo + half_width;
        let f_mid = f(mid);
        iterations += 1;
        if f_mid.is_nan() {
            return Err(RootError::NanObjective { at: mid });
        }
        if f_mid == 0.0 {
            return Ok(Root {
                value: mid,
                residual: 0.0,
                half_width: 0.5 * half_width,
                iterations,
            });
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
            f_hi = f_mid;
        }
    }
}
