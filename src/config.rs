//! Client configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/nev_client.toml` (optional; every field has a default)
//! 2. Environment variables prefixed with `NEV_CLIENT_`, nested keys separated
//!    by a double underscore (e.g. `NEV_CLIENT_SERVER__PORT=9100`)
//!
//! # Example
//! ```no_run
//! use nev_client::config::ClientConfig;
//!
//! let config = ClientConfig::load()?;
//! config.validate()?;
//! println!("Server: {}:{}", config.server.host, config.server.port);
//! # Ok::<(), nev_client::error::NevError>(())
//! ```

use crate::error::{NevError, NevResult};
use crate::sweep::config::{SamplingRate, TimingConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/nev_client.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "NEV_CLIENT_";

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend server connection
    pub server: ServerConfig,
    /// Sweep defaults
    pub sweep: SweepDefaults,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Connection settings for the backend server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// How long to wait for a terminal marker
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Replace the socket with the in-process simulator
    pub simulate: bool,
    /// Seed for the simulator's noise generator (random when absent)
    pub simulator_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            read_timeout: Duration::from_secs(5),
            simulate: false,
            simulator_seed: None,
        }
    }
}

/// Defaults applied to sweeps started from the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepDefaults {
    /// Interval between two status polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Digitizer union used for the sweep
    pub union_id: u32,
    /// Settling delay per step, in milliseconds
    pub delay_ms: u32,
    /// Wait between arming and `RUN PSA`, in milliseconds
    pub initial_delay_ms: u32,
    /// Acquisition window per step, in milliseconds
    pub period_ms: u32,
    /// Digitizer sampling rate in Hz
    pub sampling_hz: u32,
}

impl Default for SweepDefaults {
    fn default() -> Self {
        let timing = TimingConfig::default();
        Self {
            poll_interval: Duration::from_millis(100),
            union_id: 0,
            delay_ms: timing.delay_ms,
            initial_delay_ms: timing.initial_delay_ms,
            period_ms: timing.period_ms,
            sampling_hz: timing.sampling.hz(),
        }
    }
}

impl SweepDefaults {
    /// Timing block for a run request.
    pub fn timing(&self) -> NevResult<TimingConfig> {
        Ok(TimingConfig {
            delay_ms: self.delay_ms,
            initial_delay_ms: self.initial_delay_ms,
            period_ms: self.period_ms,
            sampling: SamplingRate::try_from(self.sampling_hz)?,
        })
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output with colors
    Pretty,
    /// Single-line output without colors
    Compact,
    /// Structured JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `config/nev_client.toml` and environment variables
    pub fn load() -> NevResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> NevResult<Self> {
        let config = Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> NevResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(NevError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        if self.server.host.trim().is_empty() {
            return Err(NevError::Configuration("Server host is empty".into()));
        }

        if self.server.port == 0 {
            return Err(NevError::Configuration("Server port must be non-zero".into()));
        }

        if self.sweep.poll_interval.is_zero() {
            return Err(NevError::Configuration(
                "Sweep poll interval must be non-zero".into(),
            ));
        }

        self.sweep.timing()?;
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> NevResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| NevError::Configuration(format!("Cannot render config: {e}")))
    }
}
