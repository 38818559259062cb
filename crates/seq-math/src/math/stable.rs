//! Probability clamping for values assembled from sums and log-space terms.

/// Clip a probability into [0, 1]. NaN stays NaN.
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return f64::NAN;
    }
    p.clamp(0.0, 1.0)
}

/// Exponentiate a log-probability, saturating at 1.
///
/// Terms like `exp(-rho * (b - x))` exceed one once the statistic has crossed
/// the boundary; callers treat that as certain rejection.
pub fn exp_probability(log_p: f64) -> f64 {
    if log_p.is_nan() {
        return f64::NAN;
    }
    if log_p >= 0.0 {
        return 1.0;
    }
    log_p.exp()
}
