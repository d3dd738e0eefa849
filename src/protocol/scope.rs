//! NI-SCOPE union commands (`NISCOPEINFO`, `NSU`).

use super::bracket_list;
use crate::error::{NevError, NevResult};
use crate::hardware::{VerticalCoupling, VerticalRange};
use crate::transport::{ProtocolClient, Reply};

/// Union-scoped query verbs of `GET NSU`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionQuery {
    /// Trigger setup
    Trig,
    /// Member devices
    Devs,
    /// Per-device channel configuration
    Chan,
    /// Record lengths
    Dlen,
    /// Sampling rates
    Freq,
}

impl UnionQuery {
    /// Wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            UnionQuery::Trig => "TRIG",
            UnionQuery::Devs => "DEVS",
            UnionQuery::Chan => "CHAN",
            UnionQuery::Dlen => "DLEN",
            UnionQuery::Freq => "FREQ",
        }
    }
}

/// Encoder for digitizer verbs.
#[derive(Debug, Clone)]
pub struct ScopeCommands {
    client: ProtocolClient,
}

impl ScopeCommands {
    /// Encoder over a shared client.
    pub fn new(client: ProtocolClient) -> Self {
        Self { client }
    }

    /// `GET NISCOPEINFO`
    pub async fn info(&self) -> NevResult<Reply> {
        self.client.send("GET NISCOPEINFO").await
    }

    /// `GET NSU NUM`
    pub async fn union_count(&self) -> NevResult<Reply> {
        self.client.send("GET NSU NUM").await
    }

    /// `GET NSU {TRIG|DEVS|CHAN|DLEN|FREQ} <union>`
    pub async fn union_query(&self, query: UnionQuery, union_id: u32) -> NevResult<Reply> {
        self.client
            .send(&format!("GET NSU {} {union_id}", query.as_str()))
            .await
    }

    /// `SET NSU DEVS <union> <n> [<id>...]`
    pub async fn set_union_devices(&self, union_id: u32, device_ids: &[u32]) -> NevResult<Reply> {
        self.client
            .send(&format!(
                "SET NSU DEVS {union_id} {} {}",
                device_ids.len(),
                bracket_list(device_ids)
            ))
            .await
    }

    /// `SET NSU CHAN <union> <device> [<range> <coupling>]...`
    pub async fn set_union_channels(
        &self,
        union_id: u32,
        device_id: u32,
        channels: &[(VerticalRange, VerticalCoupling)],
    ) -> NevResult<Reply> {
        if channels.is_empty() {
            return Err(NevError::Configuration(format!(
                "SET NSU CHAN {union_id} {device_id} needs at least one channel"
            )));
        }
        let blocks: Vec<String> = channels
            .iter()
            .map(|(range, coupling)| format!("[{range} {coupling}]"))
            .collect();
        self.client
            .send(&format!(
                "SET NSU CHAN {union_id} {device_id} {}",
                blocks.join(" ")
            ))
            .await
    }

    /// `SET NSU DLEN <union> <samples>`
    pub async fn set_union_data_length(&self, union_id: u32, samples: u32) -> NevResult<Reply> {
        self.client
            .send(&format!("SET NSU DLEN {union_id} {samples}"))
            .await
    }

    /// `SET NSU FREQ <union> <hz>`
    pub async fn set_union_frequency(&self, union_id: u32, hz: f64) -> NevResult<Reply> {
        self.client
            .send(&format!("SET NSU FREQ {union_id} {hz}"))
            .await
    }
}
