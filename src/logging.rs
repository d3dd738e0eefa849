//! Tracing initialisation.
//!
//! All crate code logs through `tracing` macros. This module installs the
//! subscriber once at process start, with the level and format taken from
//! [`LoggingConfig`]. `RUST_LOG` overrides the configured level when set.
//!
//! # Example
//! ```no_run
//! use nev_client::{config::ClientConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load()?;
//! logging::init_from_config(&config.logging)?;
//! tracing::info!("client started");
//! # Ok(())
//! # }
//! ```

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{NevError, NevResult};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Subscriber options
#[derive(Debug, Clone)]
pub struct TracingOptions {
    /// Minimum level when `RUST_LOG` is not set
    pub level: Level,
    /// Output format
    pub format: LogFormat,
    /// Emit span close events (carries span durations)
    pub with_span_events: bool,
    /// Include file and line numbers
    pub with_file_and_line: bool,
    /// Enable ANSI colors (pretty format only)
    pub with_ansi: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl TracingOptions {
    /// Options derived from the logging section of the config file
    pub fn from_config(config: &LoggingConfig) -> NevResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.level)?,
            format: config.format,
            ..Default::default()
        })
    }

    /// Override the level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Enable or disable span close events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the logging config section
pub fn init_from_config(config: &LoggingConfig) -> NevResult<()> {
    init(TracingOptions::from_config(config)?)
}

/// Initialize tracing with explicit options.
///
/// Calling this twice is not an error: the second call leaves the first
/// subscriber in place and returns `Ok(())`.
pub fn init(options: TracingOptions) -> NevResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_to_filter_string(options.level)));

    let span_events = if options.with_span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match options.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(options.with_file_and_line)
            .with_line_number(options.with_file_and_line)
            .with_ansi(options.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_file(options.with_file_and_line)
            .with_line_number(options.with_file_and_line)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(options.with_file_and_line)
            .with_line_number(options.with_file_and_line)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            // Tests and embedding applications may already own the dispatcher
            let msg = e.to_string();
            if msg.contains("has already been set") || msg.contains("already initialized") {
                Ok(())
            } else {
                Err(NevError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> NevResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(NevError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

fn level_to_filter_string(level: Level) -> String {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
    .to_string()
}
