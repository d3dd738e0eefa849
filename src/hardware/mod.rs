//! In-memory hardware topology.
//!
//! Decoders populate these structures from server introspection and encoders
//! read them back when re-synchronising the server. Devices are created once
//! at startup; channel data and union membership are mutated in place.

pub mod digitizer;
pub mod legend;
pub mod output;

pub use digitizer::{
    ChannelKey, DigitizerDevice, DigitizerSystem, DigitizerUnion, ScopeChannel, TriggerConfig,
    TriggerCoupling, TriggerSlope, TriggerType, UnionMember, VerticalCoupling, VerticalRange,
};
pub use output::{DeviceKind, DeviceRecord, OutputChannel, OutputDevice, OutputSystem};
