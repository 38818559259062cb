//! Logging configuration.
//!
//! The level comes from `-v` / `-q`, then `SEQ_LOG`, then `RUST_LOG`. The
//! format follows the CLI output format: JSON results get JSON-line logs.

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// Machine-parseable JSON lines.
    Jsonl,
}

impl LogFormat {
    /// Log format matching the result format on stdout.
    pub fn for_output(machine_readable: bool) -> Self {
        if machine_readable {
            LogFormat::Jsonl
        } else {
            LogFormat::Human
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// Warnings only (default; stage diagnostics are debug events).
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Level selected by `-v` / `-q` counts, relative to the default.
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Option<Self> {
        if quiet {
            return Some(LogLevel::Off);
        }
        match verbose {
            0 => None,
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }

    /// Coarse level implied by a `RUST_LOG` directive string.
    fn from_rust_log(directives: &str) -> Option<Self> {
        [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("error", LogLevel::Error),
        ]
        .into_iter()
        .find(|(name, _)| directives.contains(name))
        .map(|(_, level)| level)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(name)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl LogConfig {
    /// Create config from the environment and CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, format: LogFormat) -> Self {
        let seq_log = std::env::var("SEQ_LOG").ok();
        let rust_log = std::env::var("RUST_LOG").ok();
        Self::resolve(cli_level, seq_log.as_deref(), rust_log.as_deref(), format)
    }

    /// Precedence: CLI > SEQ_LOG > RUST_LOG > default. An unparsable
    /// `SEQ_LOG` falls back to the default, not to `RUST_LOG`.
    fn resolve(
        cli_level: Option<LogLevel>,
        seq_log: Option<&str>,
        rust_log: Option<&str>,
        format: LogFormat,
    ) -> Self {
        let env_level = match seq_log {
            Some(val) => val.parse::<LogLevel>().ok(),
            None => rust_log.and_then(LogLevel::from_rust_log),
        };
        LogConfig {
            format,
            level: cli_level.or(env_level).unwrap_or_default(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}
