//! DAQmx output commands (`SAO`, `DAO`, `SDO`).

use tracing::{debug, info, instrument};

use super::{bracket_list, overlay_stimulus};
use crate::error::{NevError, NevResult};
use crate::hardware::{DeviceKind, OutputDevice, OutputSystem};
use crate::transport::{ProtocolClient, Reply};

/// Encoder for output-device verbs.
#[derive(Debug, Clone)]
pub struct DaqmxCommands {
    client: ProtocolClient,
}

impl DaqmxCommands {
    /// Encoder over a shared client.
    pub fn new(client: ProtocolClient) -> Self {
        Self { client }
    }

    /// `GET DAQMXINFO`
    pub async fn info(&self) -> NevResult<Reply> {
        self.client.send("GET DAQMXINFO").await
    }

    /// `GET SAO|DAO|SDO <id>`
    pub async fn values(&self, kind: DeviceKind, id: u32) -> NevResult<Reply> {
        if kind == DeviceKind::Ddo {
            return Err(no_ddo_verb());
        }
        self.client.send(&format!("GET {kind} {id}")).await
    }

    /// `SET SAO|SDO <id> v1 v2 ...`, one value per channel.
    pub async fn set_static(&self, kind: DeviceKind, id: u32, values: &[f64]) -> NevResult<Reply> {
        if kind.is_dynamic() {
            return Err(NevError::Configuration(format!(
                "SET {kind} takes a waveform, not static values"
            )));
        }
        if values.is_empty() {
            return Err(NevError::Configuration(format!(
                "SET {kind} {id} needs at least one value"
            )));
        }
        let joined: Vec<String> = values.iter().map(f64::to_string).collect();
        self.client
            .send(&format!("SET {kind} {id} {}", joined.join(" ")))
            .await
    }

    /// Two-phase `SET DAO`: handshake `SET DAO <id> <chStart>`, then the
    /// payload `[ch0..] [ch1..] #OK`.
    ///
    /// Both exchanges run under one client lock; the payload is not sent when
    /// the handshake is rejected.
    #[instrument(skip(self, channels), fields(channels = channels.len()), err)]
    pub async fn set_waveform(
        &self,
        id: u32,
        channel_start: u32,
        channels: &[Vec<f64>],
    ) -> NevResult<Reply> {
        if channels.is_empty() || channels.iter().any(Vec::is_empty) {
            return Err(NevError::Configuration(format!(
                "SET DAO {id} needs at least one sample per channel"
            )));
        }
        let blocks: Vec<String> = channels.iter().map(bracket_list).collect();
        let payload = format!("{} #OK", blocks.join(" "));
        let (_, reply) = self
            .client
            .send_pair(&format!("SET DAO {id} {channel_start}"), &payload)
            .await?;
        Ok(reply)
    }

    /// `SET DAO DLEN <id> <samples>`
    pub async fn set_dao_data_length(&self, id: u32, samples: u32) -> NevResult<Reply> {
        self.client
            .send(&format!("SET DAO DLEN {id} {samples}"))
            .await
    }

    /// `SET DAO FREQ <id> <hz>`
    pub async fn set_dao_frequency(&self, id: u32, hz: f64) -> NevResult<Reply> {
        self.client.send(&format!("SET DAO FREQ {id} {hz}")).await
    }

    /// `RUN DAO <id>`
    pub async fn run_dao(&self, id: u32) -> NevResult<Reply> {
        self.client.send(&format!("RUN DAO {id}")).await
    }

    /// `STOP DAO <id>`
    pub async fn stop_dao(&self, id: u32) -> NevResult<Reply> {
        self.client.send(&format!("STOP DAO {id}")).await
    }

    /// Send one device's full configuration, dispatching on its kind tag.
    pub async fn push_device(&self, device: &OutputDevice) -> NevResult<()> {
        match device.kind {
            DeviceKind::Sao | DeviceKind::Sdo => self.push_static(device).await,
            DeviceKind::Dao => self.push_dynamic(device).await,
            DeviceKind::Ddo => Err(no_ddo_verb()),
        }
    }

    /// Send every device, in listing order. Stops at the first failure.
    pub async fn push_all(&self, system: &OutputSystem) -> NevResult<()> {
        for device in system.devices() {
            self.push_device(device).await?;
        }
        info!(devices = system.len(), "output configuration pushed");
        Ok(())
    }

    async fn push_static(&self, device: &OutputDevice) -> NevResult<()> {
        let mut values = Vec::with_capacity(device.channels.len());
        for channel in &device.channels {
            match channel.data.as_slice() {
                [value] => values.push(*value),
                other => {
                    return Err(NevError::Configuration(format!(
                        "{} {} channel {} holds {} values, static outputs take exactly one",
                        device.kind,
                        device.id,
                        channel.index,
                        other.len()
                    )))
                }
            }
        }
        debug!(id = device.id, kind = %device.kind, "pushing static values");
        self.set_static(device.kind, device.id, &values).await?;
        Ok(())
    }

    async fn push_dynamic(&self, device: &OutputDevice) -> NevResult<()> {
        let waveforms: Vec<Vec<f64>> = device
            .channels
            .iter()
            .map(|c| overlay_stimulus(&c.data, &c.stimulus))
            .collect();
        debug!(id = device.id, dlen = device.data_length, "pushing waveform");
        self.set_dao_data_length(device.id, device.data_length).await?;
        self.set_dao_frequency(device.id, device.frequency).await?;
        self.set_waveform(device.id, 0, &waveforms).await?;
        Ok(())
    }
}

fn no_ddo_verb() -> NevError {
    NevError::Configuration("DDO devices have no wire command".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn scripted() -> (DaqmxCommands, crate::transport::Script) {
        let transport = ScriptedTransport::new();
        let script = transport.script();
        (DaqmxCommands::new(ProtocolClient::new(transport)), script)
    }

    #[tokio::test]
    async fn static_and_timing_commands() {
        let (daqmx, script) = scripted();
        daqmx.set_static(DeviceKind::Sdo, 4, &[1.0, 0.0, 1.0]).await.unwrap();
        daqmx.set_dao_data_length(0, 2048).await.unwrap();
        daqmx.set_dao_frequency(0, 250_000.0).await.unwrap();
        daqmx.run_dao(0).await.unwrap();
        daqmx.stop_dao(0).await.unwrap();
        assert_eq!(
            script.calls(),
            vec![
                "SET SDO 4 1 0 1",
                "SET DAO DLEN 0 2048",
                "SET DAO FREQ 0 250000",
                "RUN DAO 0",
                "STOP DAO 0",
            ]
        );
    }

    #[tokio::test]
    async fn waveform_payload_starts_at_handshake_channel() {
        let (daqmx, script) = scripted();
        daqmx
            .set_waveform(1, 2, &[vec![0.5, -0.5], vec![0.25, 0.0]])
            .await
            .unwrap();
        assert_eq!(
            script.calls(),
            vec!["SET DAO 1 2", "[0.5 -0.5] [0.25 0] #OK"]
        );
    }

    #[tokio::test]
    async fn mismatched_kinds_are_refused_locally() {
        let (daqmx, script) = scripted();
        assert!(daqmx.set_static(DeviceKind::Dao, 0, &[1.0]).await.is_err());
        assert!(daqmx.set_static(DeviceKind::Sao, 2, &[]).await.is_err());
        assert!(daqmx.values(DeviceKind::Ddo, 6).await.is_err());
        assert!(daqmx.set_waveform(0, 0, &[vec![]]).await.is_err());
        assert!(script.calls().is_empty());
    }
}
