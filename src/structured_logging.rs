//! Structured logging support using the `tracing` crate.
//!
//! Solvers emit `tracing` events (enumeration sizes, sampling estimates,
//! relaxation values); this module wires up a subscriber so those events
//! become visible. Only available with the `structured-logging` feature:
//!
//! ```toml
//! [dependencies]
//! tensor-constraints = { version = "0.1", features = ["structured-logging"] }
//! ```

use crate::error::{ConstraintError, ConstraintResult};

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development).
    Pretty,
    /// Compact format without colors (for production).
    Compact,
    /// JSON format (for machine parsing and log aggregation).
    Json,
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Show all logs (trace level).
    Trace,
    /// Show debug and higher.
    Debug,
    /// Show info and higher.
    Info,
    /// Show warnings and errors only.
    Warn,
    /// Show only errors.
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for structured logging.
#[derive(Debug, Clone)]
pub struct TracingLoggerBuilder {
    format: LogFormat,
    level: LogLevel,
    env_filter: Option<String>,
    with_targets: bool,
}

impl Default for TracingLoggerBuilder {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: LogLevel::Info,
            env_filter: None,
            with_targets: true,
        }
    }
}

impl TracingLoggerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log level filter.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set a custom environment filter (overrides the level setting).
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Include target names (module paths) in logs.
    pub fn with_targets(mut self, enabled: bool) -> Self {
        self.with_targets = enabled;
        self
    }

    /// Build and initialize the global subscriber.
    ///
    /// Must be called at most once per process; later calls return an error.
    pub fn build(self) -> ConstraintResult<TracingLogger> {
        let env_filter = if let Some(custom) = self.env_filter {
            EnvFilter::try_new(custom)
                .map_err(|e| ConstraintError::Config(format!("invalid env filter: {e}")))?
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
        };

        let init_err =
            |e: tracing_subscriber::util::TryInitError| {
                ConstraintError::Config(format!("failed to initialize tracing: {e}"))
            };
        match self.format {
            LogFormat::Pretty => {
                let layer = fmt::layer().with_target(self.with_targets).pretty();
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init()
                    .map_err(init_err)?;
            }
            LogFormat::Compact => {
                let layer = fmt::layer()
                    .with_target(self.with_targets)
                    .with_ansi(false)
                    .compact();
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init()
                    .map_err(init_err)?;
            }
            LogFormat::Json => {
                let layer = fmt::layer().with_target(self.with_targets).json();
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer)
                    .try_init()
                    .map_err(init_err)?;
            }
        }

        Ok(TracingLogger {
            _format: self.format,
        })
    }
}

/// Handle returned by a successful subscriber initialization.
#[derive(Debug)]
pub struct TracingLogger {
    _format: LogFormat,
}

impl TracingLogger {
    /// Start configuring a logger.
    pub fn builder() -> TracingLoggerBuilder {
        TracingLoggerBuilder::new()
    }
}
