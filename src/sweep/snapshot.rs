//! Evolving state of one sweep run.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hardware::ChannelKey;
use crate::parsing::{SweepDataChunk, SweepStatusReport};

wire_enum!(
    /// Status token reported by `GET PSA STAT`.
    SweepStatus {
        /// No sweep defined yet (client-side initial value)
        Unconfigured => "UNCONFIGURED",
        /// `SET PSA` accepted
        Configured => "CONFIGURED",
        /// Configured but not started
        Idle => "IDLE",
        /// Acquiring
        Running => "RUNNING",
        /// Every step acquired
        Complete => "COMPLETE",
        /// Stopped before the last step
        Aborted => "ABORTED",
        /// Server-side failure
        Failed => "FAILED",
        /// Server could not tell
        Unknown => "UNKNOWN",
    }
);

impl Default for SweepStatus {
    fn default() -> Self {
        SweepStatus::Unconfigured
    }
}

/// Sweep-axis values and readings collected so far.
///
/// `y` holds one entry per channel that was active when the run started,
/// each entry listing one reading vector per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSnapshot {
    /// Identifier of the run this snapshot belongs to
    pub run_id: Uuid,
    /// When the run was started
    pub started_at: DateTime<Utc>,
    /// Union sampled by the run
    pub union_id: u32,
    /// Last reported step count
    pub stage: u32,
    /// Last reported sweep value
    pub last_value: f64,
    /// Last reported status
    pub status: SweepStatus,
    /// `[start, end)` step range of the latest data fetch
    pub range: Option<(u32, u32)>,
    /// Sweep value of each fetched step
    pub x: Vec<f64>,
    /// Readings per active channel
    pub y: IndexMap<ChannelKey, Vec<Vec<f64>>>,
}

impl SweepSnapshot {
    /// Fresh snapshot seeded with the run's active channel set.
    pub fn new(run_id: Uuid, union_id: u32, active: &[ChannelKey]) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            union_id,
            stage: 0,
            last_value: 0.0,
            status: SweepStatus::Unconfigured,
            range: None,
            x: Vec::new(),
            y: active.iter().map(|key| (*key, Vec::new())).collect(),
        }
    }

    /// Record a status poll.
    pub fn apply_status(&mut self, report: &SweepStatusReport) {
        self.stage = report.stage;
        self.last_value = report.last_value;
        self.status = report.status;
    }

    /// Replace axis values and readings with a full data fetch.
    pub fn replace_data(&mut self, chunk: SweepDataChunk) {
        self.range = Some((chunk.start, chunk.end));
        self.x = chunk.x;
        self.y = chunk.y;
    }

    /// Readings of one channel, one vector per step.
    pub fn readings(&self, key: ChannelKey) -> Option<&[Vec<f64>]> {
        self.y.get(&key).map(Vec::as_slice)
    }

    /// Channels carried by the snapshot, in plotting order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelKey> + '_ {
        self.y.keys().copied()
    }

    /// Number of steps held.
    pub fn step_count(&self) -> usize {
        self.x.len()
    }
}
