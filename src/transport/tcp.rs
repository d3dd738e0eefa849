//! Socket transport.
//!
//! Generic over the byte stream so tests can drive it through
//! `tokio::io::duplex` instead of a real socket.

use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use super::framing::frame_len;
use super::Transport;
use crate::error::{NevError, NevResult};

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &str = "\n";

const READ_CHUNK: usize = 4096;

/// Transport over any async byte stream.
pub struct TcpTransport<S> {
    stream: S,
    buffer: BytesMut,
    read_timeout: Duration,
    peer: String,
}

impl TcpTransport<TcpStream> {
    /// Connect to the backend server.
    #[instrument(err)]
    pub async fn connect(host: &str, port: u16, read_timeout: Duration) -> NevResult<Self> {
        let stream = tokio::time::timeout(read_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| NevError::Timeout(read_timeout))??;
        stream.set_nodelay(true)?;
        debug!(host, port, "connected to backend server");
        Ok(Self::new(stream, read_timeout).with_peer(format!("{host}:{port}")))
    }
}

impl<S> TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open stream.
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            read_timeout,
            peer: "stream".to_string(),
        }
    }

    /// Label used in log output.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    async fn read_frame(&mut self) -> NevResult<String> {
        loop {
            if let Some(len) = frame_len(&self.buffer) {
                let frame = self.buffer.split_to(len);
                return String::from_utf8(frame.to_vec()).map_err(|err| {
                    NevError::parse(
                        "a UTF-8 reply",
                        String::from_utf8_lossy(err.as_bytes()),
                    )
                });
            }
            self.buffer.reserve(READ_CHUNK);
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(NevError::ConnectionLost);
            }
        }
    }
}

#[async_trait]
impl<S> Transport for TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn exchange(&mut self, line: &str) -> NevResult<String> {
        // Leftovers belong to an earlier reply.
        self.buffer.clear();

        let mut wire = String::with_capacity(line.len() + LINE_TERMINATOR.len());
        wire.push_str(line);
        wire.push_str(LINE_TERMINATOR);
        self.stream.write_all(wire.as_bytes()).await?;
        self.stream.flush().await?;

        let raw = tokio::time::timeout(self.read_timeout, self.read_frame())
            .await
            .map_err(|_| NevError::Timeout(self.read_timeout))??;
        debug!(peer = %self.peer, bytes = raw.len(), "reply received");
        Ok(raw)
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn command_gets_terminator_and_reply_is_reassembled() {
        let (client, server) = duplex(64);
        let mut transport = TcpTransport::new(client, Duration::from_secs(1));

        let server_task = tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            // Reply in pieces to exercise reassembly.
            write.write_all(b"#NSUNUM\n").await.unwrap();
            write.write_all(b"1\n#O").await.unwrap();
            write.write_all(b"K\n").await.unwrap();
            line
        });

        let raw = transport.exchange("GET NSU NUM").await.unwrap();
        assert_eq!(raw, "#NSUNUM\n1\n#OK\n");
        assert_eq!(server_task.await.unwrap(), "GET NSU NUM\n");
    }

    #[tokio::test]
    async fn invalid_utf8_reply_is_a_parse_error() {
        let (client, server) = duplex(64);
        let mut transport = TcpTransport::new(client, Duration::from_secs(1));

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write.write_all(b"#NSUNUM\n\xff1\n#OK\n").await.unwrap();
        });

        let err = transport.exchange("GET NSU NUM").await.unwrap_err();
        assert!(matches!(err, NevError::Parse { .. }), "{err}");
    }

    #[tokio::test]
    async fn eof_mid_reply_is_connection_lost() {
        let (client, server) = duplex(64);
        let mut transport = TcpTransport::new(client, Duration::from_secs(1));

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut reader = BufReader::new(read);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write.write_all(b"#DAQMXINFO\nSAO[2,").await.unwrap();
            // Dropping both halves closes the stream.
        });

        let err = transport.exchange("GET DAQMXINFO").await.unwrap_err();
        assert!(matches!(err, NevError::ConnectionLost));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (client, _server) = duplex(64);
        let mut transport = TcpTransport::new(client, Duration::from_millis(50));
        let err = transport.exchange("GET PSA STAT").await.unwrap_err();
        assert!(matches!(err, NevError::Timeout(_)));
    }
}
