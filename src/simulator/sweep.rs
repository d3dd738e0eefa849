//! Simulated parameter sweep.
//!
//! Each status poll while running acquires one more step. Step `k` (counted
//! from 1) sits at `a + k·(b−a)/steps`, and every active channel records a
//! noisy sine scaled by that value.

use std::f64::consts::TAU;

use super::rng::SimRng;
use crate::sweep::SweepStatus;

/// Samples recorded per channel and step.
pub const SAMPLES_PER_STEP: usize = 32;
const NOISE_STD: f64 = 0.1;
const INVALID_STEPS: &str = "invalid step count";

/// One acquired step.
#[derive(Debug, Clone)]
pub struct SimStep {
    /// Sweep value
    pub value: f64,
    /// One waveform per active channel
    pub readings: Vec<Vec<f64>>,
}

/// Server-side sweep state.
#[derive(Debug)]
pub struct SimSweep {
    status: SweepStatus,
    first: f64,
    second: f64,
    steps: u32,
    channels: usize,
    failure: Option<&'static str>,
    history: Vec<SimStep>,
}

impl Default for SimSweep {
    fn default() -> Self {
        Self {
            status: SweepStatus::Unconfigured,
            first: 0.0,
            second: 0.0,
            steps: 0,
            channels: 0,
            failure: None,
            history: Vec::new(),
        }
    }
}

impl SimSweep {
    /// `SET PSA`: forget the previous run and store the range.
    pub fn configure(&mut self, first: f64, second: f64, steps: u32) {
        *self = Self {
            status: SweepStatus::Configured,
            first,
            second,
            steps,
            ..Self::default()
        };
        if steps == 0 {
            self.status = SweepStatus::Failed;
            self.failure = Some(INVALID_STEPS);
        }
    }

    /// `RUN PSA` with `channels` active digitizer channels.
    pub fn start(&mut self, channels: usize) -> Result<(), String> {
        match self.status {
            SweepStatus::Configured | SweepStatus::Idle => {
                self.channels = channels;
                self.status = SweepStatus::Running;
                Ok(())
            }
            SweepStatus::Failed => Ok(()),
            other => Err(format!("cannot run a sweep in state {other}")),
        }
    }

    /// `STOP PSA`
    pub fn stop(&mut self) {
        if matches!(
            self.status,
            SweepStatus::Running | SweepStatus::Configured | SweepStatus::Idle
        ) {
            self.status = SweepStatus::Aborted;
        }
    }

    fn value_at(&self, step: u32) -> f64 {
        self.first + f64::from(step) * (self.second - self.first) / f64::from(self.steps)
    }

    /// `GET PSA STAT`: advance one step when running, then report.
    pub fn poll(&mut self, rng: &mut SimRng) -> String {
        if self.status == SweepStatus::Running {
            let done = self.history.len() as u32;
            if done >= self.steps {
                self.status = SweepStatus::Complete;
            } else {
                let value = self.value_at(done + 1);
                let readings = (0..self.channels)
                    .map(|_| waveform(value, rng))
                    .collect();
                self.history.push(SimStep { value, readings });
            }
        }
        let stage = self.history.len();
        let value = self.history.last().map_or(self.first, |s| s.value);
        match self.failure {
            Some(message) if self.status == SweepStatus::Failed => {
                format!("#PSASTAT\n{stage} {value:.6} FAILED ! {message}")
            }
            _ => format!("#PSASTAT\n{stage} {value:.6} {}", self.status),
        }
    }

    /// Number of acquired steps.
    pub fn acquired(&self) -> u32 {
        self.history.len() as u32
    }

    /// `GET PSA DATA start-end` body.
    pub fn data(&self, start: u32, end: u32) -> Result<String, String> {
        if start > end || end > self.acquired() {
            return Err(format!(
                "invalid range {start}-{end}, {} steps acquired",
                self.acquired()
            ));
        }
        let mut out = format!("#PSADATA {start} {end}");
        for step in &self.history[start as usize..end as usize] {
            out.push_str(&format!("\n{:.6}", step.value));
            for reading in &step.readings {
                let samples: Vec<String> = reading.iter().map(|v| format!("{v:.6}")).collect();
                out.push_str(&format!("\n[{}]", samples.join(" ")));
            }
        }
        Ok(out)
    }
}

fn waveform(value: f64, rng: &mut SimRng) -> Vec<f64> {
    let last = (SAMPLES_PER_STEP - 1) as f64;
    (0..SAMPLES_PER_STEP)
        .map(|i| value * (TAU * i as f64 / last).sin() + rng.gaussian(0.0, NOISE_STD))
        .collect()
}
