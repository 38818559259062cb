//! Exit codes for the seq-core CLI.
//!
//! Exit codes communicate the trial decision without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-2: Decision outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Numerical and I/O failures

use seq_common::{Error, ErrorCategory};

use crate::design::Decision;

/// Exit codes for seq-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Decision Outcomes (0-2)
    // ========================================================================
    /// Trial continues (or the command produced a plan / design)
    Continue = 0,

    /// Null hypothesis rejected (interim stop or final rejection)
    Rejected = 1,

    /// Null hypothesis accepted at the final analysis
    Accepted = 2,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or input data
    ArgsError = 10,

    /// Invalid numerics configuration
    ConfigError = 11,

    // ========================================================================
    // Numerical / I/O Failures (20-29)
    // ========================================================================
    /// A root search did not converge or was not bracketed
    NumericalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code is a decision outcome (codes 0-2).
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for a trial outcome.
    pub fn from_decision(decision: Decision) -> Self {
        match decision {
            Decision::Continue => ExitCode::Continue,
            Decision::InterimStop | Decision::FinalReject => ExitCode::Rejected,
            Decision::FinalAccept => ExitCode::Accepted,
        }
    }

    /// Exit code for a failed command.
    pub fn from_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Input => ExitCode::ArgsError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Numerical => ExitCode::NumericalError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Continue => "OK_CONTINUE",
            ExitCode::Rejected => "OK_REJECTED",
            ExitCode::Accepted => "OK_ACCEPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::NumericalError => "ERR_NUMERICAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
