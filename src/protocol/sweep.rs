//! Parameter sweep commands (`PSA`).

use serde::{Deserialize, Serialize};

use super::tuple3;
use crate::error::NevResult;
use crate::sweep::config::SweepTarget;
use crate::transport::{ProtocolClient, Reply};

/// Range tuple exactly as sent in `SET PSA`: `[first second steps]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    /// First literal of the tuple
    pub first: f64,
    /// Second literal of the tuple
    pub second: f64,
    /// Number of steps
    pub steps: u32,
}

/// Encoder for sweep verbs.
#[derive(Debug, Clone)]
pub struct SweepCommands {
    client: ProtocolClient,
}

impl SweepCommands {
    /// Encoder over a shared client.
    pub fn new(client: ProtocolClient) -> Self {
        Self { client }
    }

    /// `GET PSA STAT`
    pub async fn status(&self) -> NevResult<Reply> {
        self.client.send("GET PSA STAT").await
    }

    /// `GET PSA DATA <start>-<end>`
    pub async fn data(&self, start: u32, end: u32) -> NevResult<Reply> {
        self.client
            .send(&format!("GET PSA DATA {start}-{end}"))
            .await
    }

    /// `SET PSA <union> [<kind> <dev> <ch>] [<a> <b> <steps>] <skip>`
    pub async fn configure(
        &self,
        union_id: u32,
        target: &SweepTarget,
        range: SweepRange,
        skip_samples: u64,
    ) -> NevResult<Reply> {
        self.client
            .send(&format_configure(union_id, target, range, skip_samples))
            .await
    }

    /// `RUN PSA`
    pub async fn run(&self) -> NevResult<Reply> {
        self.client.send("RUN PSA").await
    }

    /// `STOP PSA`
    pub async fn stop(&self) -> NevResult<Reply> {
        self.client.send("STOP PSA").await
    }
}

/// Command line for `SET PSA`.
pub fn format_configure(
    union_id: u32,
    target: &SweepTarget,
    range: SweepRange,
    skip_samples: u64,
) -> String {
    format!(
        "SET PSA {union_id} {} {} {skip_samples}",
        tuple3(target.kind, target.device_id, target.channel),
        tuple3(range.first, range.second, range.steps)
    )
}
