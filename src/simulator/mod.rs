//! In-process stand-in for the NEV control server.
//!
//! [`SimulatedServer`] speaks the same line grammar as the real server and is
//! plugged in behind [`ProtocolClient`] like any other [`Transport`], so no
//! caller changes when simulate mode is on. It keeps a small topology (two
//! static analog, two dynamic analog and two static digital outputs, two
//! 2-channel digitizers in one union) and reflects every accepted `SET` in the
//! matching `GET`.
//!
//! [`ProtocolClient`]: crate::transport::ProtocolClient

pub mod rng;
pub mod sweep;

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use self::rng::SimRng;
use self::sweep::SimSweep;
use crate::error::NevResult;
use crate::hardware::{
    DeviceKind, DeviceRecord, DigitizerDevice, DigitizerSystem, OutputDevice, OutputSystem,
    ScopeChannel, VerticalCoupling, VerticalRange,
};
use crate::parsing::bracket_blocks;
use crate::transport::Transport;

const SYNTAX_ERROR: &str = "syntax error";
const UNION_DATA_LENGTH: u32 = 1024;
const UNION_FREQUENCY: f64 = 1_000_000.0;

type SimReply = Result<String, String>;

/// Deterministic responder for simulate mode.
#[derive(Debug)]
pub struct SimulatedServer {
    outputs: OutputSystem,
    digitizers: DigitizerSystem,
    /// Channels configured per device by the last `SET NSU CHAN`.
    configured_channels: HashMap<u32, usize>,
    pending_dao: Option<(u32, u32)>,
    sweep: SimSweep,
    sweep_union: u32,
    rng: SimRng,
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SimulatedServer {
    /// Simulator with the canned topology; `seed` fixes the sweep noise.
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            outputs: canned_outputs(),
            digitizers: canned_digitizers(),
            configured_channels: HashMap::new(),
            pending_dao: None,
            sweep: SimSweep::default(),
            sweep_union: 0,
            rng: SimRng::new(seed),
        }
    }

    /// Answer one command line with a complete raw reply.
    pub fn respond(&mut self, line: &str) -> String {
        let line = line.trim();
        let result = match self.pending_dao.take() {
            Some((id, channel_start)) => self.dao_payload(id, channel_start, line),
            None => self.dispatch(line),
        };
        match result {
            Ok(text) if text.is_empty() => "#OK".to_string(),
            Ok(text) => format!("{text}\n#OK"),
            Err(message) => format!("#NG {message}\n"),
        }
    }

    fn dispatch(&mut self, line: &str) -> SimReply {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["GET", "DAQMXINFO"] => Ok(self.daqmx_info()),
            ["GET", "NISCOPEINFO"] => Ok(self.scope_info()),
            ["GET", "NSU", "NUM"] => Ok(format!("#NSUNUM\n{}", self.digitizers.unions().count())),
            ["GET", "NSU", query, union] => self.union_query(query, union),
            ["GET", "PSA", "STAT"] => Ok(self.sweep.poll(&mut self.rng)),
            ["GET", "PSA", "DATA", range] => self.sweep_data(range),
            ["GET", kind, id] => self.output_values(kind, id),

            ["SET", "DAO", "DLEN", id, value] => {
                let value: u32 = arg(value)?;
                self.output_mut(DeviceKind::Dao, id)?.set_data_length(value);
                Ok(String::new())
            }
            ["SET", "DAO", "FREQ", id, value] => {
                let value: f64 = arg(value)?;
                self.output_mut(DeviceKind::Dao, id)?.set_frequency(value);
                Ok(String::new())
            }
            ["SET", "DAO", id, channel_start] => {
                let channel_start: u32 = arg(channel_start)?;
                let device = self.output_mut(DeviceKind::Dao, id)?;
                let id = device.id;
                if channel_start as usize >= device.channel_count() {
                    return Err(format!("DAO {id} has no channel {channel_start}"));
                }
                self.pending_dao = Some((id, channel_start));
                Ok(format!("#SETDAO {id}"))
            }
            ["SET", "NSU", verb, rest @ ..] => self.set_union(verb, rest),
            ["SET", "PSA", ..] => self.set_sweep(line),
            ["SET", kind, id, values @ ..] => self.set_static(kind, id, values),

            ["RUN", "PSA"] => {
                let channels = self.active_channel_count();
                self.sweep.start(channels)?;
                Ok(String::new())
            }
            ["STOP", "PSA"] => {
                self.sweep.stop();
                Ok(String::new())
            }
            ["RUN" | "STOP", "DAO", id] => {
                self.output_mut(DeviceKind::Dao, id)?;
                Ok(String::new())
            }
            _ => Err(format!("unimplemented command: {line}")),
        }
    }

    fn daqmx_info(&self) -> String {
        let mut out = String::from("#DAQMXINFO");
        for kind in DeviceKind::ALL {
            let records: Vec<String> = self
                .outputs
                .devices_of(kind)
                .map(|d| d.record().to_string())
                .collect();
            if !records.is_empty() {
                out.push_str(&format!("\n{kind}{}", records.concat()));
            }
        }
        out
    }

    fn scope_info(&self) -> String {
        let records: Vec<String> = self
            .digitizers
            .devices()
            .map(|d| {
                format!(
                    "[{},{},{},{},{},{}]",
                    d.slot,
                    d.name,
                    d.model,
                    d.channel_count(),
                    d.chassis,
                    d.serial
                )
            })
            .collect();
        format!("#NISCOPEINFO\n{}", records.concat())
    }

    fn union_query(&self, query: &str, union: &str) -> SimReply {
        let union_id: u32 = arg(union)?;
        let union = self
            .digitizers
            .union(union_id)
            .ok_or_else(|| format!("no union {union_id}"))?;
        let body = match query {
            "DEVS" => {
                let ids: Vec<String> = union.device_ids().map(|id| id.to_string()).collect();
                format!("{} [{}]", ids.len(), ids.join(" "))
            }
            "CHAN" => {
                let mut blocks = Vec::new();
                for id in union.device_ids() {
                    if let Some(device) = self.digitizers.device(id) {
                        for channel in &device.channels {
                            blocks.push(format!(
                                "[{:.6} {}]",
                                channel.range.volts(),
                                channel.coupling
                            ));
                        }
                    }
                }
                format!("{} {}", blocks.len(), blocks.concat())
            }
            "DLEN" => {
                let per: Vec<String> = union
                    .members()
                    .map(|(_, m)| m.actual_data_length.to_string())
                    .collect();
                format!("{} [{}]", union.data_length, per.join(" "))
            }
            "FREQ" => {
                let per: Vec<String> = union
                    .members()
                    .map(|(_, m)| format!("{:.6}", m.actual_frequency))
                    .collect();
                format!("{:.6} [{}]", union.frequency, per.join(" "))
            }
            "TRIG" => {
                let t = &union.trigger;
                format!(
                    "[{:.6} {} {} {} {:.6} {} {} {:.6} {:.6}]",
                    t.ref_position,
                    t.trigger_type,
                    t.source,
                    t.device,
                    t.level,
                    t.slope,
                    t.coupling,
                    t.holdoff,
                    t.delay
                )
            }
            other => return Err(format!("unimplemented command: GET NSU {other}")),
        };
        Ok(format!("#NSU{query} {union_id}\n{body}"))
    }

    fn set_union(&mut self, verb: &str, rest: &[&str]) -> SimReply {
        // Counted with the leading `SET NSU <verb>`.
        let token_count = rest.len() + 3;
        match verb {
            "DEVS" | "CHAN" if token_count < 6 => Err(SYNTAX_ERROR.into()),
            "DLEN" | "FREQ" if token_count != 5 => Err(SYNTAX_ERROR.into()),
            "DEVS" => self.set_union_devices(rest),
            "CHAN" => self.set_union_channels(rest),
            "DLEN" => {
                let value: u32 = arg(rest[1])?;
                let union = self.union_mut(rest[0])?;
                union.data_length = value;
                for (_, member) in union.members_mut() {
                    member.actual_data_length = value;
                }
                Ok(String::new())
            }
            "FREQ" => {
                let value: f64 = arg(rest[1])?;
                let union = self.union_mut(rest[0])?;
                union.frequency = value;
                for (_, member) in union.members_mut() {
                    member.actual_frequency = value;
                }
                Ok(String::new())
            }
            other => Err(format!("unimplemented command: SET NSU {other}")),
        }
    }

    fn set_union_devices(&mut self, rest: &[&str]) -> SimReply {
        let count: usize = arg(rest[1])?;
        let joined = rest[2..].join(" ");
        let blocks = bracket_blocks(&joined).map_err(|_| SYNTAX_ERROR.to_string())?;
        let ids: Vec<u32> = match blocks.as_slice() {
            [list] => list
                .split_whitespace()
                .map(arg)
                .collect::<Result<_, _>>()?,
            _ => return Err(SYNTAX_ERROR.into()),
        };
        if ids.len() != count {
            return Err(format!("{count} devices declared, {} listed", ids.len()));
        }
        if let Some(unknown) = ids.iter().find(|id| self.digitizers.device(**id).is_none()) {
            return Err(format!("no digitizer {unknown}"));
        }
        self.union_mut(rest[0])?.set_members(&ids);
        Ok(String::new())
    }

    fn set_union_channels(&mut self, rest: &[&str]) -> SimReply {
        self.union_mut(rest[0])?;
        let device_id: u32 = arg(rest[1])?;
        let joined = rest[2..].join(" ");
        let blocks = bracket_blocks(&joined).map_err(|_| SYNTAX_ERROR.to_string())?;
        let mut settings = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block.split_whitespace().collect::<Vec<_>>().as_slice() {
                [range, coupling] => {
                    let range: VerticalRange = range.parse().map_err(|_| SYNTAX_ERROR.to_string())?;
                    let coupling: VerticalCoupling =
                        coupling.parse().map_err(|_| SYNTAX_ERROR.to_string())?;
                    settings.push((range, coupling));
                }
                _ => return Err(SYNTAX_ERROR.into()),
            }
        }
        let device = self
            .digitizers
            .device_mut(device_id)
            .ok_or_else(|| format!("no digitizer {device_id}"))?;
        if settings.len() > device.channel_count() {
            return Err(format!(
                "digitizer {device_id} has {} channels",
                device.channel_count()
            ));
        }
        for (channel, (range, coupling)) in device.channels.iter_mut().zip(&settings) {
            channel.range = *range;
            channel.coupling = *coupling;
        }
        self.configured_channels.insert(device_id, settings.len());
        Ok(String::new())
    }

    fn set_sweep(&mut self, line: &str) -> SimReply {
        // SET PSA <union> [<kind> <dev> <ch>] [<a> <b> <steps>] <skip>
        let flat = line.replace(['[', ']'], " ");
        let tokens: Vec<&str> = flat.split_whitespace().skip(2).collect();
        let [union, kind, device, channel, first, second, steps, skip] = tokens.as_slice() else {
            return Err(SYNTAX_ERROR.into());
        };
        let union_id = self.union_mut(union)?.id;
        let kind = DeviceKind::from_str(kind).map_err(|_| SYNTAX_ERROR.to_string())?;
        let device_id: u32 = arg(device)?;
        let channel: usize = arg(channel)?;
        let _skip: u64 = arg(skip)?;
        let target = self
            .outputs
            .get(device_id)
            .filter(|d| d.kind == kind)
            .ok_or_else(|| format!("no {kind} device {device_id}"))?;
        if channel >= target.channel_count() {
            return Err(format!("{kind} {device_id} has no channel {channel}"));
        }
        self.sweep.configure(arg(first)?, arg(second)?, arg(steps)?);
        self.sweep_union = union_id;
        Ok(String::new())
    }

    fn sweep_data(&self, range: &str) -> SimReply {
        let (start, end) = range.split_once('-').ok_or_else(|| SYNTAX_ERROR.to_string())?;
        let start: u32 = arg(start)?;
        let end: u32 = if end.is_empty() {
            self.sweep.acquired()
        } else {
            arg(end)?
        };
        self.sweep.data(start, end)
    }

    fn output_values(&self, kind: &str, id: &str) -> SimReply {
        let kind = DeviceKind::from_str(kind).map_err(|_| format!("unimplemented command: GET {kind} {id}"))?;
        let id: u32 = arg(id)?;
        let device = self
            .outputs
            .get(id)
            .filter(|d| d.kind == kind)
            .ok_or_else(|| format!("no {kind} device {id}"))?;
        let body = if kind.is_dynamic() {
            let blocks: Vec<String> = device
                .channels
                .iter()
                .map(|c| crate::protocol::bracket_list(&c.data))
                .collect();
            blocks.join(" ")
        } else {
            let values: Vec<String> = device
                .channels
                .iter()
                .map(|c| c.data.first().copied().unwrap_or(0.0).to_string())
                .collect();
            values.join(" ")
        };
        Ok(format!("#{kind} {id}\n{body}"))
    }

    fn set_static(&mut self, kind: &str, id: &str, values: &[&str]) -> SimReply {
        let kind = DeviceKind::from_str(kind).map_err(|_| format!("unimplemented command: SET {kind}"))?;
        if kind.is_dynamic() || values.is_empty() {
            return Err(SYNTAX_ERROR.into());
        }
        let parsed: Vec<f64> = values.iter().map(|v| arg(v)).collect::<Result<_, _>>()?;
        let device = self.output_mut(kind, id)?;
        if parsed.len() > device.channel_count() {
            return Err(format!(
                "{kind} {} has {} channels",
                device.id,
                device.channel_count()
            ));
        }
        for (channel, value) in device.channels.iter_mut().zip(parsed) {
            channel.data = vec![value];
        }
        Ok(String::new())
    }

    fn dao_payload(&mut self, id: u32, channel_start: u32, line: &str) -> SimReply {
        let payload = line
            .strip_suffix("#OK")
            .ok_or_else(|| "data block must terminate with #OK".to_string())?;
        let blocks = bracket_blocks(payload).map_err(|_| SYNTAX_ERROR.to_string())?;
        let waveforms: Vec<Vec<f64>> = blocks
            .iter()
            .map(|b| b.split_whitespace().map(arg).collect::<Result<_, _>>())
            .collect::<Result<_, _>>()?;
        let device = self
            .outputs
            .get_mut(id)
            .ok_or_else(|| format!("no DAO device {id}"))?;
        if channel_start as usize + waveforms.len() > device.channel_count() {
            return Err(format!("DAO {id} has {} channels", device.channel_count()));
        }
        for (offset, waveform) in waveforms.into_iter().enumerate() {
            if let Some(channel) = device.channel_mut(channel_start + offset as u32) {
                channel.data = waveform;
            }
        }
        Ok(String::new())
    }

    fn output_mut(&mut self, kind: DeviceKind, id: &str) -> Result<&mut OutputDevice, String> {
        let id: u32 = arg(id)?;
        self.outputs
            .get_mut(id)
            .filter(|d| d.kind == kind)
            .ok_or_else(|| format!("no {kind} device {id}"))
    }

    fn union_mut(&mut self, id: &str) -> Result<&mut crate::hardware::DigitizerUnion, String> {
        let id: u32 = arg(id)?;
        self.digitizers
            .union_mut(id)
            .ok_or_else(|| format!("no union {id}"))
    }

    /// Active channels of the swept union, as set by `SET NSU CHAN`.
    fn active_channel_count(&self) -> usize {
        let Some(union) = self.digitizers.union(self.sweep_union) else {
            return 0;
        };
        union
            .device_ids()
            .map(|id| {
                self.configured_channels.get(&id).copied().unwrap_or_else(|| {
                    self.digitizers
                        .device(id)
                        .map_or(0, DigitizerDevice::channel_count)
                })
            })
            .sum()
    }
}

#[async_trait]
impl Transport for SimulatedServer {
    async fn exchange(&mut self, line: &str) -> NevResult<String> {
        let reply = self.respond(line);
        debug!(command = line, reply = %reply.trim_end(), "simulated exchange");
        Ok(reply)
    }

    fn describe(&self) -> String {
        "simulator".to_string()
    }
}

fn arg<T: FromStr>(token: &str) -> Result<T, String> {
    token.parse().map_err(|_| SYNTAX_ERROR.to_string())
}

fn canned_outputs() -> OutputSystem {
    let mut system = OutputSystem::new();
    let devices = [
        (DeviceKind::Sao, 2, "DACS0", "PXI-6704", 16, 1, 0.0),
        (DeviceKind::Sao, 3, "DACS1", "PXI-6704", 16, 1, 0.0),
        (DeviceKind::Dao, 0, "DACD0", "PXI-6733", 8, 1024, 100_000.0),
        (DeviceKind::Dao, 1, "DACD1", "PXI-6733", 8, 1024, 100_000.0),
        (DeviceKind::Sdo, 4, "DACS0", "PXI-6704", 8, 1, 0.0),
        (DeviceKind::Sdo, 5, "DACS1", "PXI-6704", 8, 1, 0.0),
    ];
    for (kind, id, name, model, channel_count, length_or_chassis, frequency) in devices {
        system.insert(OutputDevice::from_record(
            kind,
            DeviceRecord {
                id,
                name: name.to_string(),
                model: model.to_string(),
                channel_count,
                length_or_chassis,
                frequency,
                state: 0,
            },
        ));
    }
    system
}

fn canned_digitizers() -> DigitizerSystem {
    let mut system = DigitizerSystem::new();
    let devices = [(0, 2, "DEV0", "123456"), (1, 3, "DEV1", "234567")];
    system.set_devices(
        devices
            .iter()
            .map(|(id, slot, name, serial)| DigitizerDevice {
                id: *id,
                slot: *slot,
                name: name.to_string(),
                model: "NI5122".to_string(),
                chassis: 1,
                serial: serial.to_string(),
                channels: (0..2).map(ScopeChannel::new).collect(),
            })
            .collect(),
    );
    system.reset_unions(1);
    if let Some(union) = system.union_mut(0) {
        union.set_members(&[0, 1]);
        union.data_length = UNION_DATA_LENGTH;
        union.frequency = UNION_FREQUENCY;
        for (_, member) in union.members_mut() {
            member.actual_data_length = UNION_DATA_LENGTH;
            member.actual_frequency = UNION_FREQUENCY;
        }
    }
    system
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> SimulatedServer {
        SimulatedServer::new(Some(3))
    }

    #[test]
    fn canned_topology_replies() {
        let mut sim = server();
        let info = sim.respond("GET DAQMXINFO");
        assert!(info.starts_with("#DAQMXINFO\nSAO[2,DACS0,PXI-6704,16,1,0.000000,0]"));
        assert!(info.contains("\nDAO[0,DACD0,PXI-6733,8,1024,100000.000000,0]"));
        assert_eq!(
            sim.respond("GET NISCOPEINFO"),
            "#NISCOPEINFO\n[2,DEV0,NI5122,2,1,123456][3,DEV1,NI5122,2,1,234567]\n#OK"
        );
        assert_eq!(sim.respond("GET NSU NUM"), "#NSUNUM\n1\n#OK");
        assert_eq!(sim.respond("GET NSU DEVS 0"), "#NSUDEVS 0\n2 [0 1]\n#OK");
        assert_eq!(
            sim.respond("GET NSU TRIG 0"),
            "#NSUTRIG 0\n[0.500000 EDGE 0 0 0.000000 POSITIVE DC 0.000000 0.000000]\n#OK"
        );
    }

    #[test]
    fn union_settings_are_reflected() {
        let mut sim = server();
        assert_eq!(sim.respond("SET NSU DEVS 0 1 [1]"), "#OK");
        assert_eq!(sim.respond("SET NSU CHAN 0 1 [1 AC]"), "#OK");
        assert_eq!(sim.respond("SET NSU DLEN 0 5000"), "#OK");
        assert_eq!(
            sim.respond("GET NSU CHAN 0"),
            "#NSUCHAN 0\n2 [1.000000 AC][5.000000 DC]\n#OK"
        );
        assert_eq!(sim.respond("GET NSU DLEN 0"), "#NSUDLEN 0\n5000 [5000]\n#OK");
        assert_eq!(sim.active_channel_count(), 1);
    }

    #[test]
    fn malformed_union_settings_are_rejected() {
        let mut sim = server();
        assert_eq!(sim.respond("SET NSU DLEN 0"), "#NG syntax error\n");
        assert_eq!(sim.respond("SET NSU DEVS 0 2"), "#NG syntax error\n");
        assert!(sim.respond("SET NSU DEVS 0 3 [0 1]").starts_with("#NG"));
        assert_eq!(sim.respond("GET NSU DEVS 0"), "#NSUDEVS 0\n2 [0 1]\n#OK");
    }

    #[test]
    fn static_and_dynamic_outputs_are_stored() {
        let mut sim = server();
        assert_eq!(sim.respond("SET SAO 2 0.5 1.5"), "#OK");
        assert!(sim.respond("GET SAO 2").starts_with("#SAO 2\n0.5 1.5 0 "));

        assert_eq!(sim.respond("SET DAO 0 1"), "#SETDAO 0\n#OK");
        assert_eq!(sim.respond("[1 2] [3 4] #OK"), "#OK");
        let values = sim.respond("GET DAO 0");
        assert!(values.contains("[1 2] [3 4]"), "{values}");

        assert_eq!(sim.respond("SET DAO 0 0"), "#SETDAO 0\n#OK");
        assert!(sim.respond("[1 2]").starts_with("#NG"));
    }

    #[test]
    fn unknown_commands_are_refused() {
        let mut sim = server();
        assert_eq!(
            sim.respond("FROB PSA"),
            "#NG unimplemented command: FROB PSA\n"
        );
        assert!(sim.respond("SET DDO 6 1").starts_with("#NG"));
    }

    #[test]
    fn sweep_runs_to_completion() {
        let mut sim = server();
        assert_eq!(sim.respond("SET PSA 0 [SAO 2 0] [0 1 2] 2500"), "#OK");
        assert_eq!(sim.respond("RUN PSA"), "#OK");
        assert_eq!(sim.respond("GET PSA STAT"), "#PSASTAT\n1 0.500000 RUNNING\n#OK");
        assert_eq!(sim.respond("GET PSA STAT"), "#PSASTAT\n2 1.000000 RUNNING\n#OK");
        assert_eq!(sim.respond("GET PSA STAT"), "#PSASTAT\n2 1.000000 COMPLETE\n#OK");
        let data = sim.respond("GET PSA DATA 0-2");
        assert!(data.starts_with("#PSADATA 0 2\n0.000000") || data.starts_with("#PSADATA 0 2\n0.500000"));
        assert_eq!(data.lines().filter(|l| l.starts_with('[')).count(), 2 * 4);
        assert!(sim.respond("GET PSA DATA 0-3").starts_with("#NG"));
    }

    #[test]
    fn sweep_target_must_exist() {
        let mut sim = server();
        assert!(sim.respond("SET PSA 0 [SAO 0 0] [0 1 2] 0").starts_with("#NG"));
        assert!(sim.respond("SET PSA 0 [SAO 2 0] [0 1] 0").starts_with("#NG"));
    }
}
