//! Shared types for the adaptive sequential testing workspace.
//!
//! - Error taxonomy with stable codes, categories and remediation hints
//! - Output format selection for the CLI

pub mod error;
pub mod output;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use output::OutputFormat;
