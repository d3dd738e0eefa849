//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use nev_client::hardware::{
    DeviceKind, DeviceRecord, DigitizerDevice, DigitizerSystem, OutputDevice, OutputSystem,
    ScopeChannel,
};
use nev_client::sweep::{RunRequest, SweepConfig, SweepDirection, SweepRunner, SweepTarget, TimingConfig};
use nev_client::transport::{Script, ScriptedTransport};
use nev_client::ProtocolClient;

/// Client over a fresh scripted transport, plus the script handle.
pub fn scripted_client() -> (ProtocolClient, Script) {
    let transport = ScriptedTransport::new();
    let script = transport.script();
    (ProtocolClient::new(transport), script)
}

/// Runner that polls without waiting.
pub fn fast_runner(client: &ProtocolClient) -> SweepRunner {
    SweepRunner::new(client.clone()).with_poll_interval(Duration::from_millis(1))
}

pub fn output(kind: DeviceKind, id: u32, channels: u32, length_or_chassis: u32) -> OutputDevice {
    OutputDevice::from_record(
        kind,
        DeviceRecord {
            id,
            name: format!("{kind}{id}"),
            model: "PXI-6704".to_string(),
            channel_count: channels,
            length_or_chassis,
            frequency: if kind.is_dynamic() { 100_000.0 } else { 0.0 },
            state: 0,
        },
    )
}

pub fn digitizer(id: u32, channels: u32) -> DigitizerDevice {
    DigitizerDevice {
        id,
        slot: id + 2,
        name: format!("DEV{id}"),
        model: "NI5122".to_string(),
        chassis: 1,
        serial: format!("10000{id}"),
        channels: (0..channels).map(ScopeChannel::new).collect(),
    }
}

/// SAO 2 with two channels and a single-channel digitizer 0 in union 0.
pub fn small_request(steps: u32) -> RunRequest {
    let mut outputs = OutputSystem::new();
    outputs.insert(output(DeviceKind::Sao, 2, 2, 1));

    let mut digitizers = DigitizerSystem::new();
    digitizers.set_devices(vec![digitizer(0, 1)]);
    digitizers.reset_unions(1);

    RunRequest {
        union_id: 0,
        sweep: SweepConfig {
            target: SweepTarget {
                kind: DeviceKind::Sao,
                device_id: 2,
                channel: 0,
            },
            start: 0.0,
            stop: 5.0,
            steps,
            direction: SweepDirection::Ascending,
        },
        timing: TimingConfig {
            initial_delay_ms: 0,
            ..TimingConfig::default()
        },
        outputs,
        digitizers,
    }
}

/// `GET PSA STAT` reply.
pub fn stat(stage: u32, status: &str) -> String {
    format!("#PSASTAT\n{stage} {:.6} {status}\n#OK", f64::from(stage))
}

/// `GET PSA DATA 0-<end>` reply for `channels` active channels.
pub fn data(end: u32, channels: usize) -> String {
    let mut out = format!("#PSADATA 0 {end}");
    for step in 1..=end {
        out.push_str(&format!("\n{:.6}", f64::from(step)));
        for _ in 0..channels {
            out.push_str(&format!("\n[{step}.0 {step}.5]"));
        }
    }
    out.push_str("\n#OK");
    out
}
