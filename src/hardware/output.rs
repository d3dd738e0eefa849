//! Output devices (NI DAQmx cards).
//!
//! Output devices come in four kinds along two independent axes:
//!
//! | kind | dynamic | analog |
//! |------|---------|--------|
//! | SAO  | no      | yes    |
//! | DAO  | yes     | yes    |
//! | SDO  | no      | no     |
//! | DDO  | yes     | no     |
//!
//! Static devices hold one value per channel and always report a data length
//! of 1 and a frequency of 0. Dynamic devices hold a waveform per channel,
//! sampled at the device frequency.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NevError;

/// Output device kind tag. Command fan-out dispatches on this, never on type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Static analog output
    #[serde(rename = "SAO")]
    Sao,
    /// Dynamic analog output
    #[serde(rename = "DAO")]
    Dao,
    /// Static digital output
    #[serde(rename = "SDO")]
    Sdo,
    /// Dynamic digital output
    #[serde(rename = "DDO")]
    Ddo,
}

impl DeviceKind {
    /// All kinds in listing order.
    pub const ALL: [DeviceKind; 4] = [DeviceKind::Sao, DeviceKind::Dao, DeviceKind::Sdo, DeviceKind::Ddo];

    /// Waveform (true) or single value (false) per channel.
    pub fn is_dynamic(self) -> bool {
        matches!(self, DeviceKind::Dao | DeviceKind::Ddo)
    }

    /// Analog (true) or digital (false) output.
    pub fn is_analog(self) -> bool {
        matches!(self, DeviceKind::Sao | DeviceKind::Dao)
    }

    /// Wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Sao => "SAO",
            DeviceKind::Dao => "DAO",
            DeviceKind::Sdo => "SDO",
            DeviceKind::Ddo => "DDO",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = NevError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SAO" => Ok(DeviceKind::Sao),
            "DAO" => Ok(DeviceKind::Dao),
            "SDO" => Ok(DeviceKind::Sdo),
            "DDO" => Ok(DeviceKind::Ddo),
            other => Err(NevError::Configuration(format!(
                "Unknown output device kind '{other}'"
            ))),
        }
    }
}

/// One channel of an output device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChannel {
    /// Index unique within the owning device
    pub index: u32,
    /// Current value(s): one entry for static devices, a waveform otherwise
    pub data: Vec<f64>,
    /// Stimulus overlay added on top of `data` before transmission
    pub stimulus: Vec<f64>,
}

impl OutputChannel {
    /// Zero-filled channel of the given length.
    pub fn zeroed(index: u32, data_length: usize) -> Self {
        Self {
            index,
            data: vec![0.0; data_length],
            stimulus: vec![0.0; data_length],
        }
    }
}

/// An output device as reported by `GET DAQMXINFO`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDevice {
    /// Server-side task id
    pub id: u32,
    /// Device name (e.g. `DACS0`)
    pub name: String,
    /// Hardware model (e.g. `PXI-6704`)
    pub model: String,
    /// Kind tag
    pub kind: DeviceKind,
    /// Chassis slot, reported instead of a data length for static devices
    pub chassis: Option<u32>,
    /// Samples per channel (1 for static devices)
    pub data_length: u32,
    /// Output sample rate in Hz (0 for static devices)
    pub frequency: f64,
    /// Server-reported device state code
    pub state: i32,
    /// Channels in index order
    pub channels: Vec<OutputChannel>,
}

impl OutputDevice {
    /// Build a device with zeroed channels from its info record.
    ///
    /// For static kinds the record's fifth field is the chassis slot and the
    /// data length and frequency are forced to 1 and 0.
    pub fn from_record(kind: DeviceKind, record: DeviceRecord) -> Self {
        let (chassis, data_length, frequency) = if kind.is_dynamic() {
            (None, record.length_or_chassis, record.frequency)
        } else {
            (Some(record.length_or_chassis), 1, 0.0)
        };
        let channels = (0..record.channel_count)
            .map(|idx| OutputChannel::zeroed(idx, data_length as usize))
            .collect();
        Self {
            id: record.id,
            name: record.name,
            model: record.model,
            kind,
            chassis,
            data_length,
            frequency,
            state: record.state,
            channels,
        }
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Resize every channel's data and stimulus to a new waveform length.
    ///
    /// No-op for static devices, whose length is pinned to 1.
    pub fn set_data_length(&mut self, data_length: u32) {
        if !self.kind.is_dynamic() {
            return;
        }
        self.data_length = data_length;
        for channel in &mut self.channels {
            channel.data.resize(data_length as usize, 0.0);
            channel.stimulus.resize(data_length as usize, 0.0);
        }
    }

    /// Set the output frequency. Ignored for static devices.
    pub fn set_frequency(&mut self, frequency: f64) {
        if self.kind.is_dynamic() {
            self.frequency = frequency;
        }
    }

    /// Channel by index.
    pub fn channel_mut(&mut self, index: u32) -> Option<&mut OutputChannel> {
        self.channels.iter_mut().find(|c| c.index == index)
    }

    /// Re-encode the device as its info record.
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            id: self.id,
            name: self.name.clone(),
            model: self.model.clone(),
            channel_count: self.channels.len() as u32,
            length_or_chassis: self.chassis.unwrap_or(self.data_length),
            frequency: self.frequency,
            state: self.state,
        }
    }
}

/// The seven comma-separated fields of one `GET DAQMXINFO` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Task id
    pub id: u32,
    /// Device name
    pub name: String,
    /// Hardware model
    pub model: String,
    /// Channel count
    pub channel_count: u32,
    /// Data length for dynamic kinds, chassis slot for static kinds
    pub length_or_chassis: u32,
    /// Output frequency in Hz
    pub frequency: f64,
    /// Device state code
    pub state: i32,
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{},{},{:.6},{}]",
            self.id,
            self.name,
            self.model,
            self.channel_count,
            self.length_or_chassis,
            self.frequency,
            self.state
        )
    }
}

/// All output devices known to the server, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSystem {
    devices: IndexMap<u32, OutputDevice>,
}

impl OutputSystem {
    /// Empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device, keeping its original position on replace.
    pub fn insert(&mut self, device: OutputDevice) {
        self.devices.insert(device.id, device);
    }

    /// Device by id.
    pub fn get(&self, id: u32) -> Option<&OutputDevice> {
        self.devices.get(&id)
    }

    /// Mutable device by id.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut OutputDevice> {
        self.devices.get_mut(&id)
    }

    /// Devices in listing order.
    pub fn devices(&self) -> impl Iterator<Item = &OutputDevice> {
        self.devices.values()
    }

    /// Devices of one kind, in listing order.
    pub fn devices_of(&self, kind: DeviceKind) -> impl Iterator<Item = &OutputDevice> {
        self.devices.values().filter(move |d| d.kind == kind)
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no devices are known.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Channels summed over every device.
    pub fn total_channel_count(&self) -> usize {
        self.devices.values().map(OutputDevice::channel_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: u32, kind: DeviceKind, channels: u32, fifth: u32, freq: f64) -> OutputDevice {
        OutputDevice::from_record(
            kind,
            DeviceRecord {
                id,
                name: format!("DEV{id}"),
                model: "PXI-67xx".to_string(),
                channel_count: channels,
                length_or_chassis: fifth,
                frequency: freq,
                state: 0,
            },
        )
    }

    #[test]
    fn capability_queries() {
        assert!(!DeviceKind::Sao.is_dynamic() && DeviceKind::Sao.is_analog());
        assert!(DeviceKind::Dao.is_dynamic() && DeviceKind::Dao.is_analog());
        assert!(!DeviceKind::Sdo.is_dynamic() && !DeviceKind::Sdo.is_analog());
        assert!(DeviceKind::Ddo.is_dynamic() && !DeviceKind::Ddo.is_analog());
    }

    #[test]
    fn kind_tokens_are_case_sensitive() {
        for kind in DeviceKind::ALL {
            assert_eq!(kind.as_str().parse::<DeviceKind>().unwrap(), kind);
        }
        assert!("sao".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn static_devices_pin_length_and_frequency() {
        let mut dev = device(2, DeviceKind::Sao, 16, 1, 12.0);
        assert_eq!(dev.data_length, 1);
        assert_eq!(dev.frequency, 0.0);
        assert_eq!(dev.chassis, Some(1));
        dev.set_data_length(64);
        dev.set_frequency(1000.0);
        assert_eq!(dev.data_length, 1);
        assert_eq!(dev.frequency, 0.0);
        assert!(dev.channels.iter().all(|c| c.data.len() == 1));
    }

    #[test]
    fn dynamic_resize_keeps_existing_samples() {
        let mut dev = device(0, DeviceKind::Dao, 2, 3, 1e5);
        dev.channels[0].data = vec![1.0, 2.0, 3.0];
        dev.set_data_length(5);
        assert_eq!(dev.channels[0].data, vec![1.0, 2.0, 3.0, 0.0, 0.0]);
        assert_eq!(dev.channels[1].stimulus.len(), 5);
    }

    #[test]
    fn system_keeps_listing_order() {
        let mut system = OutputSystem::new();
        system.insert(device(2, DeviceKind::Sao, 2, 1, 0.0));
        system.insert(device(0, DeviceKind::Dao, 3, 8, 1e5));
        system.insert(device(4, DeviceKind::Sdo, 1, 1, 0.0));
        let ids: Vec<u32> = system.devices().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 0, 4]);
        assert_eq!(system.total_channel_count(), 6);
        assert_eq!(system.devices_of(DeviceKind::Dao).count(), 1);
    }

    #[test]
    fn record_display_matches_listing_format() {
        let dev = device(0, DeviceKind::Dao, 8, 1024, 100000.0);
        assert_eq!(
            dev.record().to_string(),
            "[0,DEV0,PXI-67xx,8,1024,100000.000000,0]"
        );
    }
}
