//! Request/response transport.
//!
//! [`Transport`] is the seam between the protocol layer and the byte source:
//! a socket ([`TcpTransport`]) or the in-process [`SimulatedServer`]. Callers
//! only ever see [`ProtocolClient`], which is the same type whichever backend
//! sits underneath.
//!
//! At most one request is in flight at any time. `ProtocolClient` is a cheap
//! clone around a single `tokio::sync::Mutex`, and every exchange holds the
//! lock from write to terminal marker, so foreground configuration calls and
//! the sweep poll loop can share a client without interleaving.
//!
//! [`SimulatedServer`]: crate::simulator::SimulatedServer

pub mod framing;
pub mod scripted;
pub mod tcp;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::ServerConfig;
use crate::error::{NevError, NevResult};
use crate::simulator::SimulatedServer;

pub use framing::{parse_reply, Reply};
pub use scripted::{Script, ScriptedTransport};
pub use tcp::TcpTransport;

/// One line out, one marker-terminated reply back.
#[async_trait]
pub trait Transport: Send {
    /// Send `line` (without terminator) and return the raw reply, marker included.
    async fn exchange(&mut self, line: &str) -> NevResult<String>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "transport".to_string()
    }
}

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Serialized protocol endpoint shared by encoders and the sweep runner.
#[derive(Clone)]
pub struct ProtocolClient {
    transport: SharedTransport,
    label: Arc<str>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("transport", &self.label)
            .finish()
    }
}

impl ProtocolClient {
    /// Client over any transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        let label: Arc<str> = Arc::from(transport.describe());
        Self {
            transport: Arc::new(Mutex::new(Box::new(transport))),
            label,
        }
    }

    /// Client over a TCP connection to the configured server.
    pub async fn connect(config: &ServerConfig) -> NevResult<Self> {
        let transport =
            TcpTransport::connect(&config.host, config.port, config.read_timeout).await?;
        Ok(Self::new(transport))
    }

    /// Client over the in-process simulator.
    pub fn simulated(seed: Option<u64>) -> Self {
        Self::new(SimulatedServer::new(seed))
    }

    /// Pick the backend from the `simulate` flag.
    pub async fn from_config(config: &ServerConfig) -> NevResult<Self> {
        if config.simulate {
            Ok(Self::simulated(config.simulator_seed))
        } else {
            Self::connect(config).await
        }
    }

    /// Which backend this client talks to.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send one command and decode the reply frame.
    #[instrument(skip(self), fields(transport = %self.label), err)]
    pub async fn send(&self, command: &str) -> NevResult<Reply> {
        let mut transport = self.transport.lock().await;
        exchange(&mut **transport, command).await
    }

    /// Send two commands back to back without letting another request in between.
    ///
    /// Used for handshake-then-payload exchanges. The second command is not
    /// sent when the first one fails.
    #[instrument(skip(self, second), fields(transport = %self.label), err)]
    pub async fn send_pair(&self, first: &str, second: &str) -> NevResult<(Reply, Reply)> {
        let mut transport = self.transport.lock().await;
        let handshake = exchange(&mut **transport, first).await?;
        let payload = exchange(&mut **transport, second).await?;
        Ok((handshake, payload))
    }

    /// Send one command and return the raw reply text (markers included).
    pub async fn send_raw(&self, command: &str) -> NevResult<String> {
        check_command(command)?;
        let mut transport = self.transport.lock().await;
        transport.exchange(command).await
    }
}

fn check_command(command: &str) -> NevResult<()> {
    if command.contains(['\n', '\r']) {
        return Err(NevError::Configuration(format!(
            "Command must be a single line: {command:?}"
        )));
    }
    Ok(())
}

async fn exchange(transport: &mut (dyn Transport + 'static), command: &str) -> NevResult<Reply> {
    check_command(command)?;
    debug!(command, "sending");
    let raw = transport.exchange(command).await?;
    debug!(reply = %raw.trim_end(), "received");
    parse_reply(&raw)
}
