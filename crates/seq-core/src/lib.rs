//! Adaptive Sequential Testing Core Library
//!
//! This library provides the engines behind the `seq-core` CLI:
//! - Local design (SPRT-shaped boundaries re-solved at every look)
//! - Global design driven by a precomputed working test
//! - Conditional power and sample-size planning
//! - Exact p-values, median-unbiased estimates and confidence limits
//! - Numerics configuration, exit codes and structured logging
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod design;
pub mod exit_codes;
pub mod logging;

pub use config::NumericsConfig;
pub use design::{
    AnalysisOptions, AnalysisReport, Decision, DecisionRecord, DesignKind, GlobalDesign, History,
    LocalDesign, WorkingTest, WorkingTestSpec,
};
