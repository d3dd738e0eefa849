//! Parameter sweeps: run definition, snapshot, orchestrator and reduction.

pub mod config;
pub mod reduce;
pub mod runner;
pub mod snapshot;

pub use config::{
    RunRequest, SamplingRate, SweepConfig, SweepDirection, SweepTarget, TimingConfig,
};
pub use reduce::{mean_curve, std_mean_curves, Curve, StdMean, XAxis};
pub use runner::{RunOutcome, RunState, SweepEvent, SweepRunner};
pub use snapshot::{SweepSnapshot, SweepStatus};
