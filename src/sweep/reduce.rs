//! Reduction of per-step reading vectors to plottable curves.
//!
//! Every reading vector collapses to its mean and population standard
//! deviation. The X axis is either the sweep value of each step or the mean
//! curve of another channel, selected by its legend string.

use serde::Serialize;
use std::str::FromStr;

use super::snapshot::SweepSnapshot;
use crate::error::{NevError, NevResult};
use crate::hardware::legend::parse_legend;
use crate::hardware::ChannelKey;

/// Mean and population standard deviation of one reading vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StdMean {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl StdMean {
    /// Reduce a vector; empty input yields NaN for both figures.
    pub fn of(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Source of the X coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XAxis {
    /// Sweep value of each step
    #[default]
    SweepValues,
    /// Mean curve of an active channel
    Channel(ChannelKey),
}

impl FromStr for XAxis {
    type Err = NevError;

    /// `sweep` or a legend such as `Dev 0 chn 1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("sweep") {
            Ok(XAxis::SweepValues)
        } else {
            parse_legend(s).map(XAxis::Channel)
        }
    }
}

/// One reduced channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curve {
    /// Channel the points come from
    pub channel: ChannelKey,
    /// X coordinate per step
    pub x: Vec<f64>,
    /// Reduced reading per step
    pub y: Vec<StdMean>,
}

/// Per-step means of one channel's readings.
pub fn mean_curve(readings: &[Vec<f64>]) -> Vec<f64> {
    readings.iter().map(|r| StdMean::of(r).mean).collect()
}

/// Reduce every channel of `snapshot` against the chosen X axis.
///
/// With a channel as X axis, that channel is left out of the result.
pub fn std_mean_curves(snapshot: &SweepSnapshot, x_axis: XAxis) -> NevResult<Vec<Curve>> {
    let x = match x_axis {
        XAxis::SweepValues => snapshot.x.clone(),
        XAxis::Channel(key) => {
            let readings = snapshot.readings(key).ok_or_else(|| {
                NevError::Configuration(format!("X axis channel '{key}' is not part of this run"))
            })?;
            mean_curve(readings)
        }
    };

    let mut curves = Vec::new();
    for (key, readings) in &snapshot.y {
        if x_axis == XAxis::Channel(*key) {
            continue;
        }
        if readings.len() != x.len() {
            return Err(NevError::Configuration(format!(
                "'{key}' has {} steps but the X axis has {}",
                readings.len(),
                x.len()
            )));
        }
        curves.push(Curve {
            channel: *key,
            x: x.clone(),
            y: readings.iter().map(|r| StdMean::of(r)).collect(),
        });
    }
    Ok(curves)
}
