//! Command encoders.
//!
//! Each encoder method formats one command line, performs exactly one
//! exchange (two for the DAO handshake) and returns the decoded reply frame.
//! Encoders hold no state beyond a [`ProtocolClient`] handle.
//!
//! Formatting rules shared by every verb:
//! - lists render as `[v1 v2 v3]`
//! - tuples render as `[a b c]`
//! - numbers use their `Display` form (no fixed precision)
//!
//! [`ProtocolClient`]: crate::transport::ProtocolClient

pub mod daqmx;
pub mod scope;
pub mod sweep;

pub use daqmx::DaqmxCommands;
pub use scope::ScopeCommands;
pub use sweep::{SweepCommands, SweepRange};

use std::fmt::Display;

/// Render values as a bracketed, space-separated list.
pub fn bracket_list<I>(values: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let inner: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
    format!("[{}]", inner.join(" "))
}

/// Render a three-element tuple.
pub fn tuple3(a: impl Display, b: impl Display, c: impl Display) -> String {
    format!("[{a} {b} {c}]")
}

/// Superimpose a stimulus onto base data, element by element.
///
/// The result is as long as the longer input. Past its end, the shorter
/// series keeps contributing its last value (0.0 when it is empty).
pub fn overlay_stimulus(data: &[f64], stimulus: &[f64]) -> Vec<f64> {
    if stimulus.is_empty() {
        return data.to_vec();
    }
    let len = data.len().max(stimulus.len());
    let held = |series: &[f64], i: usize| -> f64 {
        series
            .get(i)
            .or_else(|| series.last())
            .copied()
            .unwrap_or(0.0)
    };
    (0..len).map(|i| held(data, i) + held(stimulus, i)).collect()
}
