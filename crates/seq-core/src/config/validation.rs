//! Semantic validation for numerics configuration.
//!
//! Values must be not just well-typed but usable: tolerances positive,
//! grids dense enough for Simpson's rule, schedules non-degenerate.

use thiserror::Error;

use super::NumericsConfig;

/// Smallest grid density that still resolves a normal kernel.
pub const MIN_SIMPSON_DIV: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("tolerance {field} must be positive and finite (got {value})")]
    ToleranceNonPositive { field: &'static str, value: f64 },

    #[error("simpson_div must be at least {MIN_SIMPSON_DIV} (got {value})")]
    GridTooCoarse { value: usize },

    #[error("basic_schedule_num must be at least 1")]
    EmptySchedule,

    #[error("schedule_power must be positive and finite (got {value})")]
    SchedulePower { value: f64 },

    #[error("horizon_factor must be at least 1 (got {value})")]
    HorizonFactor { value: f64 },

    #[error("max_iter must be positive")]
    NoIterations,
}

/// Validate numerics configuration semantically.
pub fn validate_numerics(config: &NumericsConfig) -> Result<(), ValidationError> {
    for (field, value) in [
        ("tol_root", config.tol_root),
        ("tol_boundary", config.tol_boundary),
        ("tol_cost", config.tol_cost),
        ("tol_sample_size", config.tol_sample_size),
        ("tol_estimate", config.tol_estimate),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::ToleranceNonPositive { field, value });
        }
    }
    if config.simpson_div < MIN_SIMPSON_DIV {
        return Err(ValidationError::GridTooCoarse {
            value: config.simpson_div,
        });
    }
    if config.basic_schedule_num == 0 {
        return Err(ValidationError::EmptySchedule);
    }
    if !config.schedule_power.is_finite() || config.schedule_power <= 0.0 {
        return Err(ValidationError::SchedulePower {
            value: config.schedule_power,
        });
    }
    if !config.horizon_factor.is_finite() || config.horizon_factor < 1.0 {
        return Err(ValidationError::HorizonFactor {
            value: config.horizon_factor,
        });
    }
    if config.max_iter == 0 {
        return Err(ValidationError::NoIterations);
    }
    Ok(())
}
