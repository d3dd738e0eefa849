//! Error types for the NEV client.
//!
//! `NevError` is the single error type returned by every layer of the crate,
//! from the socket up to the sweep orchestrator. Each variant corresponds to
//! one failure class callers are expected to tell apart:
//!
//! - **`ConnectionLost`**: the server closed the socket before a terminal
//!   marker arrived. The connection should be considered dead.
//! - **`Timeout`**: no terminal marker within the configured read timeout.
//! - **`Protocol`**: the server answered with `#NG`; the message is kept verbatim.
//! - **`SweepFailed`**: a sweep status reply carried the inline `FAILED` token.
//!   This is a sweep-side failure, the transport itself is healthy.
//! - **`Parse`**: a reply body did not match the grammar of its command. The
//!   error names the expected shape and carries the offending fragment.
//! - **`Configuration`**: the caller asked for something the hardware model or
//!   the wire grammar cannot express (unknown device kind, DDO output, a static
//!   channel holding a waveform, invalid config file values).
//! - **`RunInProgress`**: a sweep was started while another one is active.
//! - **`Io`** / **`Config`**: wrapped lower-level errors.
//!
//! Nothing in this crate retries on any of these. Retry policy belongs to the
//! caller.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type NevResult<T> = std::result::Result<T, NevError>;

/// Longest fragment kept verbatim inside a [`NevError::Parse`].
const MAX_FRAGMENT_LEN: usize = 120;

/// Error type shared by all layers of the client.
#[derive(Error, Debug)]
pub enum NevError {
    /// Socket closed before a complete reply was read.
    #[error("Connection lost while waiting for a reply")]
    ConnectionLost,

    /// No terminal marker arrived in time.
    #[error("No reply from server within {0:?}")]
    Timeout(Duration),

    /// Server returned the `#NG` marker.
    #[error("Server rejected command: {0}")]
    Protocol(String),

    /// Sweep status embedded a `FAILED` token.
    #[error("Sweep failed: {0}")]
    SweepFailed(String),

    /// Malformed reply body.
    #[error("Parse error: expected {expected}, got '{fragment}'")]
    Parse {
        /// Shape the decoder was looking for.
        expected: String,
        /// Offending piece of the reply (possibly truncated).
        fragment: String,
    },

    /// Caller-side precondition violated.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A sweep is already running.
    #[error("A sweep run is already in progress")]
    RunInProgress,

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file or environment could not be extracted.
    #[error("Config load error: {0}")]
    Config(Box<figment::Error>),
}

impl From<figment::Error> for NevError {
    fn from(err: figment::Error) -> Self {
        NevError::Config(Box::new(err))
    }
}

impl NevError {
    /// Build a [`NevError::Parse`], truncating oversized fragments.
    pub fn parse(expected: impl Into<String>, fragment: impl AsRef<str>) -> Self {
        let fragment = fragment.as_ref();
        let fragment = if fragment.chars().count() > MAX_FRAGMENT_LEN {
            let head: String = fragment.chars().take(MAX_FRAGMENT_LEN).collect();
            format!("{head}...")
        } else {
            fragment.to_string()
        };
        NevError::Parse {
            expected: expected.into(),
            fragment,
        }
    }

    /// Whether the underlying connection should be treated as unusable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            NevError::ConnectionLost | NevError::Timeout(_) | NevError::Io(_)
        )
    }
}
