//! Digitizer devices (NI-SCOPE) and the unions that group them.
//!
//! A union's member order is part of the wire contract: the server answers
//! `GET NSU CHAN|DLEN|FREQ` with arrays indexed by member position, and
//! expects `SET NSU CHAN` in the same order. Members are therefore held in an
//! [`IndexMap`] and never re-sorted.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::NevError;
use crate::hardware::legend;

wire_enum!(
    /// Input coupling of a digitizer channel.
    VerticalCoupling {
        /// AC coupled
        Ac => "AC",
        /// DC coupled
        Dc => "DC",
        /// Grounded input
        Gnd => "GND",
        /// Reported but not recognised by the server
        Unknown => "UNKNOWN",
    }
);

wire_enum!(
    /// How the acquisition is triggered.
    TriggerType {
        /// Free running
        Immediate => "IMMEDIATE",
        /// Edge on the trigger source
        Edge => "EDGE",
    }
);

wire_enum!(
    /// Edge direction for edge triggers.
    TriggerSlope {
        /// Rising edge
        Positive => "POSITIVE",
        /// Falling edge
        Negative => "NEGATIVE",
    }
);

wire_enum!(
    /// Coupling of the trigger input.
    TriggerCoupling {
        /// AC coupled
        Ac => "AC",
        /// DC coupled
        Dc => "DC",
        /// High-frequency reject
        HfReject => "HF_REJECT",
        /// Low-frequency reject
        LfReject => "LF_REJECT",
        /// AC plus high-frequency reject (token spelled as the server spells it)
        AcPlusHfReject => "AC_PULS_HF_REJECT",
    }
);

/// Vertical range of a digitizer channel, as a symmetric voltage span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerticalRange {
    /// ±1 V
    OneVolt,
    /// ±5 V
    FiveVolts,
}

impl VerticalRange {
    /// Every supported span.
    pub const ALL: &'static [VerticalRange] = &[VerticalRange::OneVolt, VerticalRange::FiveVolts];

    /// Span in volts.
    pub fn volts(self) -> f64 {
        match self {
            VerticalRange::OneVolt => 1.0,
            VerticalRange::FiveVolts => 5.0,
        }
    }

    /// Span from a decoded voltage, exact match only.
    pub fn from_volts(volts: f64) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.volts() == volts)
    }
}

impl fmt::Display for VerticalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.volts())
    }
}

impl FromStr for VerticalRange {
    type Err = NevError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f64>()
            .ok()
            .and_then(Self::from_volts)
            .ok_or_else(|| NevError::parse("a vertical range of 1 or 5 volts", s))
    }
}

/// Configuration of one digitizer channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeChannel {
    /// Index within the device
    pub index: u32,
    /// Vertical range
    pub range: VerticalRange,
    /// Vertical coupling
    pub coupling: VerticalCoupling,
    /// Whether the channel takes part in sweeps
    pub active: bool,
}

impl ScopeChannel {
    /// ±5 V, DC, active.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            range: VerticalRange::FiveVolts,
            coupling: VerticalCoupling::Dc,
            active: true,
        }
    }
}

/// A digitizer as reported by `GET NISCOPEINFO`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitizerDevice {
    /// Global id (position in the info listing)
    pub id: u32,
    /// PXI slot
    pub slot: u32,
    /// Device name
    pub name: String,
    /// Hardware model
    pub model: String,
    /// Chassis number
    pub chassis: u32,
    /// Serial number
    pub serial: String,
    /// Channels in index order
    pub channels: Vec<ScopeChannel>,
}

impl DigitizerDevice {
    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Mutable channel by index.
    pub fn channel_mut(&mut self, index: u32) -> Option<&mut ScopeChannel> {
        self.channels.iter_mut().find(|c| c.index == index)
    }

    /// Active channels in index order.
    pub fn active_channels(&self) -> impl Iterator<Item = &ScopeChannel> {
        self.channels.iter().filter(|c| c.active)
    }
}

/// Trigger settings of a union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Reference position within the record
    pub ref_position: f64,
    /// Trigger type
    pub trigger_type: TriggerType,
    /// Trigger source token (channel number or external line name)
    pub source: String,
    /// Device providing the trigger
    pub device: u32,
    /// Trigger level in volts
    pub level: f64,
    /// Edge direction
    pub slope: TriggerSlope,
    /// Trigger coupling
    pub coupling: TriggerCoupling,
    /// Holdoff in seconds
    pub holdoff: f64,
    /// Delay in seconds
    pub delay: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            ref_position: 0.5,
            trigger_type: TriggerType::Edge,
            source: "0".to_string(),
            device: 0,
            level: 0.0,
            slope: TriggerSlope::Positive,
            coupling: TriggerCoupling::Dc,
            holdoff: 0.0,
            delay: 0.0,
        }
    }
}

/// Per-device acquisition figures reported inside a union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnionMember {
    /// Record length the device actually uses
    pub actual_data_length: u32,
    /// Sampling rate the device actually uses
    pub actual_frequency: f64,
}

/// Devices sampled together under one timing and trigger setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitizerUnion {
    /// Union number
    pub id: u32,
    /// Aggregate record length
    pub data_length: u32,
    /// Aggregate sampling rate in Hz
    pub frequency: f64,
    /// Trigger setup
    pub trigger: TriggerConfig,
    members: IndexMap<u32, UnionMember>,
}

impl DigitizerUnion {
    /// Empty union.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            data_length: 0,
            frequency: 0.0,
            trigger: TriggerConfig::default(),
            members: IndexMap::new(),
        }
    }

    /// Member device ids in protocol order.
    pub fn device_ids(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.members.keys().copied()
    }

    /// Members in protocol order.
    pub fn members(&self) -> impl Iterator<Item = (u32, &UnionMember)> {
        self.members.iter().map(|(id, m)| (*id, m))
    }

    /// Mutable members in protocol order.
    pub fn members_mut(&mut self) -> impl Iterator<Item = (u32, &mut UnionMember)> {
        self.members.iter_mut().map(|(id, m)| (*id, m))
    }

    /// Number of member devices.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the union has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether a device belongs to the union.
    pub fn contains(&self, device_id: u32) -> bool {
        self.members.contains_key(&device_id)
    }

    /// Replace the member list. The given order becomes the protocol order;
    /// figures of devices that stay members are kept.
    pub fn set_members(&mut self, ids: &[u32]) {
        let previous = std::mem::take(&mut self.members);
        self.members = ids
            .iter()
            .map(|id| (*id, previous.get(id).copied().unwrap_or_default()))
            .collect();
    }
}

/// Address of one digitizer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    /// Global device id
    pub device_id: u32,
    /// Channel index within the device
    pub channel: u32,
}

impl ChannelKey {
    /// Key for a device/channel pair.
    pub fn new(device_id: u32, channel: u32) -> Self {
        Self { device_id, channel }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&legend::format_legend(*self))
    }
}

// Serialized as its legend so it can key JSON maps.
impl Serialize for ChannelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChannelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        legend::parse_legend(&text).map_err(serde::de::Error::custom)
    }
}

/// All digitizers and unions known to the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitizerSystem {
    devices: IndexMap<u32, DigitizerDevice>,
    unions: IndexMap<u32, DigitizerUnion>,
}

impl DigitizerSystem {
    /// Empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the device list.
    pub fn set_devices(&mut self, devices: Vec<DigitizerDevice>) {
        self.devices = devices.into_iter().map(|d| (d.id, d)).collect();
    }

    /// Device by id.
    pub fn device(&self, id: u32) -> Option<&DigitizerDevice> {
        self.devices.get(&id)
    }

    /// Mutable device by id.
    pub fn device_mut(&mut self, id: u32) -> Option<&mut DigitizerDevice> {
        self.devices.get_mut(&id)
    }

    /// Devices in listing order.
    pub fn devices(&self) -> impl Iterator<Item = &DigitizerDevice> {
        self.devices.values()
    }

    /// Reset the union table to `count` empty unions numbered from 0.
    pub fn reset_unions(&mut self, count: u32) {
        self.unions = (0..count).map(|id| (id, DigitizerUnion::new(id))).collect();
    }

    /// Union by id.
    pub fn union(&self, id: u32) -> Option<&DigitizerUnion> {
        self.unions.get(&id)
    }

    /// Mutable union by id.
    pub fn union_mut(&mut self, id: u32) -> Option<&mut DigitizerUnion> {
        self.unions.get_mut(&id)
    }

    /// Unions in id order.
    pub fn unions(&self) -> impl Iterator<Item = &DigitizerUnion> {
        self.unions.values()
    }

    /// Channels summed over every device.
    pub fn total_channel_count(&self) -> usize {
        self.devices.values().map(DigitizerDevice::channel_count).sum()
    }

    /// Active channels, by device listing order and then channel index.
    pub fn active_channels(&self) -> Vec<ChannelKey> {
        self.devices
            .values()
            .flat_map(|d| d.active_channels().map(move |c| ChannelKey::new(d.id, c.index)))
            .collect()
    }

    /// Distinct devices owning at least one active channel, in first-appearance order.
    pub fn active_devices(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = Vec::new();
        for key in self.active_channels() {
            if !ids.contains(&key.device_id) {
                ids.push(key.device_id);
            }
        }
        ids
    }

    /// Mark a channel active or inactive.
    pub fn set_channel_active(&mut self, key: ChannelKey, active: bool) -> bool {
        match self
            .devices
            .get_mut(&key.device_id)
            .and_then(|d| d.channel_mut(key.channel))
        {
            Some(channel) => {
                channel.active = active;
                true
            }
            None => false,
        }
    }
}
