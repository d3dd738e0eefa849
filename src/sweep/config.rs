//! Sweep definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{NevError, NevResult};
use crate::hardware::{DeviceKind, DigitizerSystem, OutputSystem};
use crate::protocol::SweepRange;

/// Which way the swept parameter moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepDirection {
    /// From start to stop
    #[default]
    Ascending,
    /// From stop to start
    Descending,
}

impl fmt::Display for SweepDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepDirection::Ascending => write!(f, "UP"),
            SweepDirection::Descending => write!(f, "DOWN"),
        }
    }
}

/// Digitizer sampling rates offered for sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingRate {
    /// 50 kHz
    #[default]
    K50,
    /// 100 kHz
    K100,
    /// 150 kHz
    K150,
}

impl SamplingRate {
    /// Rate in Hz.
    pub fn hz(self) -> u32 {
        match self {
            SamplingRate::K50 => 50_000,
            SamplingRate::K100 => 100_000,
            SamplingRate::K150 => 150_000,
        }
    }
}

impl TryFrom<u32> for SamplingRate {
    type Error = NevError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        match hz {
            50_000 => Ok(SamplingRate::K50),
            100_000 => Ok(SamplingRate::K100),
            150_000 => Ok(SamplingRate::K150),
            other => Err(NevError::Configuration(format!(
                "Unsupported sampling rate {other} Hz (expected 50000, 100000 or 150000)"
            ))),
        }
    }
}

/// The output channel whose value is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTarget {
    /// Device kind tag
    pub kind: DeviceKind,
    /// Output device id
    pub device_id: u32,
    /// Channel index on that device
    pub channel: u32,
}

/// Per-run sweep definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Swept parameter
    pub target: SweepTarget,
    /// Start value
    pub start: f64,
    /// Stop value
    pub stop: f64,
    /// Number of steps
    pub steps: u32,
    /// Direction
    pub direction: SweepDirection,
}

impl SweepConfig {
    /// Range tuple as sent on the wire.
    ///
    /// Ascending sends `start stop`, descending sends `stop start`. The
    /// literals are sent as given, whichever one is numerically larger.
    pub fn encoded_range(&self) -> SweepRange {
        let (first, second) = match self.direction {
            SweepDirection::Ascending => (self.start, self.stop),
            SweepDirection::Descending => (self.stop, self.start),
        };
        SweepRange {
            first,
            second,
            steps: self.steps,
        }
    }

    /// Check the target against the known outputs.
    pub fn validate(&self, outputs: &OutputSystem) -> NevResult<()> {
        if self.steps == 0 {
            return Err(NevError::Configuration("Sweep needs at least one step".into()));
        }
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(NevError::Configuration("Sweep bounds must be finite".into()));
        }
        let device = outputs.get(self.target.device_id).ok_or_else(|| {
            NevError::Configuration(format!(
                "Sweep target device {} is not a known output",
                self.target.device_id
            ))
        })?;
        if device.kind != self.target.kind {
            return Err(NevError::Configuration(format!(
                "Sweep target {} {} is a {} device",
                self.target.kind, self.target.device_id, device.kind
            )));
        }
        if self.target.channel as usize >= device.channel_count() {
            return Err(NevError::Configuration(format!(
                "Device {} has no channel {}",
                device.id, self.target.channel
            )));
        }
        Ok(())
    }
}

/// Acquisition timing of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Settling delay per step, in milliseconds
    pub delay_ms: u32,
    /// Wait between `SET PSA` and `RUN PSA`, in milliseconds
    pub initial_delay_ms: u32,
    /// Acquisition window per step, in milliseconds
    pub period_ms: u32,
    /// Digitizer sampling rate
    pub sampling: SamplingRate,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            delay_ms: 50,
            initial_delay_ms: 100,
            period_ms: 100,
            sampling: SamplingRate::K50,
        }
    }
}

impl TimingConfig {
    /// Leading samples discarded per step: `delay × sampling rate`.
    ///
    /// Delay is in milliseconds and the rate in Hz, so the product is 1000
    /// times the sample count the delay spans. The server's expectation is
    /// unknown; the formula is kept as the server has always received it.
    pub fn skip_samples(&self) -> u64 {
        u64::from(self.delay_ms) * u64::from(self.sampling.hz())
    }

    /// Record length for one acquisition window.
    pub fn data_length(&self) -> u32 {
        (f64::from(self.period_ms) * f64::from(self.sampling.hz()) / 1000.0).round() as u32
    }

    /// Wait before `RUN PSA`.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.initial_delay_ms))
    }
}

/// Everything a run needs, captured when the run starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Digitizer union sampled during the sweep
    pub union_id: u32,
    /// Sweep definition
    pub sweep: SweepConfig,
    /// Acquisition timing
    pub timing: TimingConfig,
    /// Output configuration pushed before the run
    pub outputs: OutputSystem,
    /// Digitizer topology and active-channel selection
    pub digitizers: DigitizerSystem,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{DeviceRecord, OutputDevice};

    fn sweep(direction: SweepDirection) -> SweepConfig {
        SweepConfig {
            target: SweepTarget {
                kind: DeviceKind::Sao,
                device_id: 2,
                channel: 0,
            },
            start: 1.0,
            stop: 5.0,
            steps: 10,
            direction,
        }
    }

    #[test]
    fn direction_controls_range_order() {
        let up = sweep(SweepDirection::Ascending).encoded_range();
        assert_eq!((up.first, up.second, up.steps), (1.0, 5.0, 10));
        let down = sweep(SweepDirection::Descending).encoded_range();
        assert_eq!((down.first, down.second, down.steps), (5.0, 1.0, 10));
    }

    #[test]
    fn descending_sends_literals_even_when_reversed() {
        let mut config = sweep(SweepDirection::Descending);
        config.start = 5.0;
        config.stop = 1.0;
        let range = config.encoded_range();
        assert_eq!((range.first, range.second), (1.0, 5.0));
    }

    #[test]
    fn timing_derivations() {
        let timing = TimingConfig::default();
        assert_eq!(timing.skip_samples(), 2_500_000);
        assert_eq!(timing.data_length(), 5000);
        let fast = TimingConfig {
            period_ms: 3,
            sampling: SamplingRate::K150,
            ..timing
        };
        assert_eq!(fast.data_length(), 450);
        assert_eq!(fast.initial_delay(), Duration::from_millis(100));
    }

    #[test]
    fn sampling_rate_choices() {
        assert_eq!(SamplingRate::try_from(100_000).unwrap(), SamplingRate::K100);
        assert!(SamplingRate::try_from(44_100).is_err());
    }

    #[test]
    fn validate_checks_target() {
        let mut outputs = OutputSystem::new();
        outputs.insert(OutputDevice::from_record(
            DeviceKind::Sao,
            DeviceRecord {
                id: 2,
                name: "DACS0".into(),
                model: "PXI-6704".into(),
                channel_count: 4,
                length_or_chassis: 1,
                frequency: 0.0,
                state: 0,
            },
        ));
        assert!(sweep(SweepDirection::Ascending).validate(&outputs).is_ok());

        let mut bad = sweep(SweepDirection::Ascending);
        bad.target.channel = 4;
        assert!(bad.validate(&outputs).is_err());

        let mut bad = sweep(SweepDirection::Ascending);
        bad.target.kind = DeviceKind::Sdo;
        assert!(bad.validate(&outputs).is_err());

        let mut bad = sweep(SweepDirection::Ascending);
        bad.steps = 0;
        assert!(bad.validate(&outputs).is_err());
    }
}
