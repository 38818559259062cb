//! Error types for adaptive sequential testing.
//!
//! Errors carry:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Numerical Search Did Not Converge
//!   Reason: local intercept search did not converge after 200 iterations ...
//!   Fix: Raise max_iter or loosen the tolerance in the numerics config ...
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "numerical",
//!   "message": "local intercept search did not converge after 200 iterations",
//!   "recoverable": true,
//!   "context": { "site": "local_intercept", "last_iterate": 3.21 }
//! }
//! ```

use seq_math::RootError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for sequential testing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input contract violations (arity, domain, schedule order).
    Input,
    /// Root-finding and quadrature failures.
    Numerical,
    /// Numerics configuration errors.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("invalid argument `{name}`: {message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error("invalid analysis schedule: {0}")]
    InvalidSchedule(String),

    #[error("length mismatch: {left} has {left_len} entries but {right} has {right_len}")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    // Numerical errors (20-29)
    #[error("{site} search did not converge after {iterations} iterations (last iterate {last_iterate}, residual {residual:e})")]
    NotConverged {
        site: &'static str,
        iterations: usize,
        last_iterate: f64,
        residual: f64,
    },

    #[error("{site} search has no sign change on [{lower}, {upper}]")]
    NoBracket {
        site: &'static str,
        lower: f64,
        upper: f64,
    },

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Configuration errors (30-39)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            name,
            message: message.into(),
        }
    }

    /// Attach a solve-site name to a root-finder failure.
    pub fn from_root(site: &'static str, err: RootError) -> Self {
        match err {
            RootError::NotBracketed { lower, upper, .. } => Error::NoBracket { site, lower, upper },
            RootError::NotConverged {
                iterations,
                last_iterate,
                residual,
            } => Error::NotConverged {
                site,
                iterations,
                last_iterate,
                residual,
            },
            RootError::NanObjective { at } => {
                Error::NumericalInstability(format!("{site} objective is NaN at {at}"))
            }
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Input errors
    /// - 20-29: Numerical errors
    /// - 30-39: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidArgument { .. } => 10,
            Error::InvalidSchedule(_) => 11,
            Error::LengthMismatch { .. } => 12,
            Error::NotConverged { .. } => 20,
            Error::NoBracket { .. } => 21,
            Error::NumericalInstability(_) => 22,
            Error::Config(_) => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument { .. } | Error::InvalidSchedule(_) | Error::LengthMismatch { .. } => {
                ErrorCategory::Input
            }
            Error::NotConverged { .. } | Error::NoBracket { .. } | Error::NumericalInstability(_) => {
                ErrorCategory::Numerical
            }
            Error::Config(_) => ErrorCategory::Config,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by the caller.
    ///
    /// Input errors are final for the given inputs. Non-convergence can be
    /// accepted as an approximate answer or retried with looser tolerances.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidArgument { .. } => false,
            Error::InvalidSchedule(_) => false,
            Error::LengthMismatch { .. } => false,

            Error::NotConverged { .. } => true,
            Error::NoBracket { .. } => true,
            Error::NumericalInstability(_) => false,

            Error::Config(_) => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Best iterate of a failed search, for callers willing to accept it.
    pub fn last_iterate(&self) -> Option<f64> {
        match self {
            Error::NotConverged { last_iterate, .. } => Some(*last_iterate),
            _ => None,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::InvalidArgument { .. } => {
                "Check the argument against its documented range (probabilities in (0, 1), effect sizes > 0)."
            }
            Error::InvalidSchedule(_) => {
                "Information times must be finite, positive and strictly increasing."
            }
            Error::LengthMismatch { .. } => {
                "Pass exactly one statistic (and one cost, if given) per analysis time."
            }
            Error::NotConverged { .. } => {
                "Raise max_iter or loosen the tolerance in the numerics config, or accept the reported last iterate."
            }
            Error::NoBracket { .. } => {
                "The target is unreachable on the search range. Check the effect size and power target."
            }
            Error::NumericalInstability(_) => {
                "Inputs drive the computation outside floating-point range. Rescale information times."
            }
            Error::Config(_) => "Fix the numerics config file or the SEQ_* environment overrides.",
            Error::Io(_) => "Check that the file exists and is readable.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::InvalidArgument { .. } => "Invalid Argument",
            Error::InvalidSchedule(_) => "Invalid Analysis Schedule",
            Error::LengthMismatch { .. } => "Input Length Mismatch",
            Error::NotConverged { .. } => "Numerical Search Did Not Converge",
            Error::NoBracket { .. } => "Numerical Search Not Bracketed",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::Config(_) => "Configuration Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., solve site, last iterate).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidArgument { name, .. } => {
                context.insert("argument".to_string(), serde_json::json!(name));
            }
            Error::NotConverged {
                site,
                iterations,
                last_iterate,
                residual,
            } => {
                context.insert("site".to_string(), serde_json::json!(site));
                context.insert("iterations".to_string(), serde_json::json!(iterations));
                context.insert("last_iterate".to_string(), serde_json::json!(last_iterate));
                context.insert("residual".to_string(), serde_json::json!(residual));
            }
            Error::NoBracket { site, lower, upper } => {
                context.insert("site".to_string(), serde_json::json!(site));
                context.insert("lower".to_string(), serde_json::json!(lower));
                context.insert("upper".to_string(), serde_json::json!(upper));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::invalid("alpha", "must lie in (0, 1)").code(), 10);
        assert_eq!(Error::InvalidSchedule("x".into()).code(), 11);
        assert_eq!(Error::Config("x".into()).code(), 30);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::InvalidSchedule("x".into()).category(), ErrorCategory::Input);
        assert_eq!(
            Error::NumericalInstability("x".into()).category(),
            ErrorCategory::Numerical
        );
        assert_eq!(Error::Config("x".into()).category(), ErrorCategory::Config);
    }

    #[test]
    fn test_root_error_mapping_keeps_last_iterate() {
        let err = Error::from_root(
            "sample_size",
            RootError::NotConverged {
                iterations: 200,
                last_iterate: 41.5,
                residual: 1e-3,
            },
        );
        assert_eq!(err.code(), 20);
        assert_eq!(err.last_iterate(), Some(41.5));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("sample_size"));

        let err = Error::from_root(
            "boundary",
            RootError::NotBracketed {
                lower: 0.0,
                upper: 1.0,
                f_lower: 1.0,
                f_upper: 2.0,
            },
        );
        assert_eq!(err.code(), 21);
        assert_eq!(err.last_iterate(), None);
    }

    #[test]
    fn test_input_errors_not_recoverable() {
        assert!(!Error::invalid("effect", "must be positive").is_recoverable());
        assert!(!Error::LengthMismatch {
            left: "times",
            left_len: 3,
            right: "stats",
            right_len: 2
        }
        .is_recoverable());
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::NotConverged {
            site: "local_intercept",
            iterations: 200,
            last_iterate: 3.5,
            residual: 0.01,
        };
        let structured = StructuredError::from(&err);
        assert_eq!(
            structured.context.get("site"),
            Some(&serde_json::json!("local_intercept"))
        );
        let json = structured.to_json();
        assert!(json.contains(r#""code":20"#));
        assert!(json.contains(r#""category":"numerical""#));
        assert!(json.contains(r#""recoverable":true"#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::invalid("alpha", "must lie in (0, 1), got 1.5");
        let formatted = format_error_human(&err, false);
        assert!(formatted.contains("Invalid Argument"));
        assert!(formatted.contains("got 1.5"));
        assert!(formatted.contains("Fix:"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Numerical.to_string(), "numerical");
        assert_eq!(ErrorCategory::Io.to_string(), "io");
    }
}
