//! Tracing subscriber setup.
//!
//! Every diagnostic the checks produce is a `tracing` event: problems are
//! `warn`, summaries `info`, and the fragment debug mask output `debug`. This
//! module installs a `tracing-subscriber` formatter for them. `RUST_LOG`
//! overrides the configured level when set.
//!
//! # Example
//! ```no_run
//! use daq_integtest::{config::IntegtestConfig, tracing_setup};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IntegtestConfig::load()?;
//! tracing_setup::init_from_config(&config)?;
//! tracing::info!("checks starting");
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::IntegtestConfig;
use crate::error::{CheckResult, IntegtestError};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, colored output for interactive use.
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to include the event target
    pub with_target: bool,
    /// Whether to enable ANSI colors (never used for JSON)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_file_and_line: false,
            with_target: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from the application section of a loaded config.
    pub fn from_config(config: &IntegtestConfig) -> CheckResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: parse_format(&config.application.log_format)?,
            ..Default::default()
        })
    }

    /// Create tracing config with custom settings
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// Whether the selected format writes ANSI escapes.
    pub fn ansi_enabled(&self) -> bool {
        self.with_ansi && self.format != OutputFormat::Json
    }
}

/// Initialize tracing from a loaded configuration.
pub fn init_from_config(config: &IntegtestConfig) -> CheckResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Initialize tracing with custom configuration.
///
/// Idempotent: if a global subscriber is already installed this returns `Ok(())`.
pub fn init(config: TracingConfig) -> CheckResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let ansi = config.ansi_enabled();
    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_target(config.with_target)
            .with_ansi(ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_target(config.with_target)
            .with_ansi(ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_file(config.with_file_and_line)
            .with_line_number(config.with_file_and_line)
            .with_target(config.with_target)
            .with_ansi(ansi)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            // Tests and embedding callers may have installed one already.
            if e
                .to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(IntegtestError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> CheckResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(IntegtestError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

fn parse_format(format: &str) -> CheckResult<OutputFormat> {
    match format.to_lowercase().as_str() {
        "pretty" => Ok(OutputFormat::Pretty),
        "compact" => Ok(OutputFormat::Compact),
        "json" => Ok(OutputFormat::Json),
        _ => Err(IntegtestError::Configuration(format!(
            "Invalid log format '{format}'. Must be one of: pretty, compact, json"
        ))),
    }
}
