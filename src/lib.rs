//! # NEV Client Core Library
//!
//! Control client for the NEV lab-instrument server. The server drives PXI
//! output cards (DAQmx) and digitizers (NI-SCOPE) and runs parameter sweeps
//! on request; this crate speaks its line-oriented TCP protocol, mirrors the
//! hardware topology in memory and orchestrates sweeps.
//!
//! ## Crate Structure
//!
//! - **`transport`**: the `Transport` seam, marker-based reply framing, the TCP
//!   backend and `ProtocolClient`, which serializes every exchange.
//! - **`simulator`**: an in-process server used in simulate mode.
//! - **`protocol`**: command encoders for the `DAQMX`, `NSU` and `PSA` verbs.
//! - **`parsing`**: reply decoders populating the topology model.
//! - **`hardware`**: output devices, digitizers and digitizer unions.
//! - **`discovery`**: builds the topology from the server's own description.
//! - **`sweep`**: run definitions, the `SweepRunner` state machine, snapshots
//!   and curve reduction.
//! - **`config`** / **`logging`** / **`error`**: ambient configuration, tracing
//!   setup and the crate-wide `NevError`.

#[macro_use]
mod macros;

pub mod config;
pub mod discovery;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod parsing;
pub mod protocol;
pub mod simulator;
pub mod sweep;
pub mod transport;

pub use config::ClientConfig;
pub use error::{NevError, NevResult};
pub use transport::ProtocolClient;
