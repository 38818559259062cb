//! Numerics configuration for the sequential engines.
//!
//! This module handles:
//! - Defaults for every tolerance, grid density and iteration cap
//! - Loading from TOML or JSON files (by extension)
//! - Environment overrides (`SEQ_SIMPSON_DIV`, `SEQ_MAX_ITER`)
//! - Semantic validation

pub mod validation;

pub use validation::{validate_numerics, ValidationError};

use serde::{Deserialize, Serialize};
use seq_math::BisectionConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment override for [`NumericsConfig::simpson_div`].
pub const ENV_SIMPSON_DIV: &str = "SEQ_SIMPSON_DIV";
/// Environment override for [`NumericsConfig::max_iter`].
pub const ENV_MAX_ITER: &str = "SEQ_MAX_ITER";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in config file {path}: {source}")]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid TOML in config file {path}: {source}")]
    TomlError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    EnvOverride { var: &'static str, value: String },

    #[error("Semantic validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl From<ConfigError> for seq_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::IoError { source, .. } => seq_common::Error::Io(source),
            other => seq_common::Error::Config(other.to_string()),
        }
    }
}

/// Tunables of the numerical engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NumericsConfig {
    /// Half-step tolerance of the local-design intercept search.
    pub tol_root: f64,
    /// Tolerance of working-test and global stage boundary searches.
    pub tol_boundary: f64,
    /// Absolute tolerance on the realized alpha during cost calibration.
    pub tol_cost: f64,
    /// Relative tolerance on information time in the sample-size search.
    pub tol_sample_size: f64,
    /// Tolerance on effect size in estimation searches.
    pub tol_estimate: f64,
    /// Quadrature points per standard deviation.
    pub simpson_div: usize,
    /// Number of analyses in the working test's basic schedule.
    pub basic_schedule_num: usize,
    /// Exponent of the power-law basic schedule.
    pub schedule_power: f64,
    /// Basic schedule end as a multiple of the fixed-sample information.
    pub horizon_factor: f64,
    /// Hard cap on every bisection loop.
    pub max_iter: usize,
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            tol_root: 1e-8,
            tol_boundary: 1e-6,
            tol_cost: 1e-5,
            tol_sample_size: 1e-4,
            tol_estimate: 1e-6,
            simpson_div: 6,
            basic_schedule_num: 10,
            schedule_power: 1.5,
            horizon_factor: 1.5,
            max_iter: 200,
        }
    }
}

impl NumericsConfig {
    /// Load from a `.toml` or `.json` file, apply env overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config: NumericsConfig = if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonError {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::TomlError {
                path: path.to_path_buf(),
                source: e,
            })?
        };
        config.with_env_overrides()?.validated()
    }

    /// Resolve configuration: explicit file if given, defaults otherwise.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::default().with_env_overrides()?.validated(),
        }
    }

    /// Apply `SEQ_SIMPSON_DIV` / `SEQ_MAX_ITER` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(
            std::env::var(ENV_SIMPSON_DIV).ok().as_deref(),
            std::env::var(ENV_MAX_ITER).ok().as_deref(),
        )
    }

    fn with_overrides(
        mut self,
        simpson_div: Option<&str>,
        max_iter: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = simpson_div {
            self.simpson_div = raw.trim().parse().map_err(|_| ConfigError::EnvOverride {
                var: ENV_SIMPSON_DIV,
                value: raw.to_string(),
            })?;
        }
        if let Some(raw) = max_iter {
            self.max_iter = raw.trim().parse().map_err(|_| ConfigError::EnvOverride {
                var: ENV_MAX_ITER,
                value: raw.to_string(),
            })?;
        }
        Ok(self)
    }

    /// Validate and return self.
    pub fn validated(self) -> Result<Self, ConfigError> {
        validate_numerics(&self)?;
        Ok(self)
    }

    pub fn root_bisection(&self) -> BisectionConfig {
        BisectionConfig::new(self.tol_root, self.max_iter)
    }

    pub fn boundary_bisection(&self) -> BisectionConfig {
        BisectionConfig::new(self.tol_boundary, self.max_iter)
    }

    pub fn estimate_bisection(&self) -> BisectionConfig {
        BisectionConfig::new(self.tol_estimate, self.max_iter)
    }
}
