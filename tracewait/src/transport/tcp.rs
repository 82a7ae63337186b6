//! Raw TCP transport with CRLF/LF line framing.

use std::io;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use super::Transport;
use super::config::{TcpConfig, TcpMode};
use super::line::LineBuffer;
use crate::error::TransportError;

/// Size of a single socket read.
const READ_CHUNK: usize = 4096;

/// Raw TCP transport, as client or single-peer server.
///
/// Reads and writes use separate halves of the socket behind separate
/// locks, so a send never waits for the receive loop's pending read.
pub struct TcpTransport {
    /// Configuration used for this connection.
    config: TcpConfig,

    /// Read half plus the line framing state.
    reader: Mutex<Option<Reader>>,

    /// Write half. The lock serializes concurrent senders.
    writer: Mutex<Option<OwnedWriteHalf>>,
}

struct Reader {
    stream: OwnedReadHalf,
    lines: LineBuffer,
}

impl TcpTransport {
    /// Create an unconnected transport.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    async fn open_stream(&self) -> Result<TcpStream, TransportError> {
        let address = self.config.socket_addr();
        let timeout = self.config.connect_timeout();

        match self.config.mode {
            TcpMode::Client => {
                debug!("tcp: trying to connect to '{}'", address);
                tokio::time::timeout(timeout, TcpStream::connect(address.as_str()))
                    .await
                    .map_err(|_| TransportError::Timeout(timeout))?
                    .map_err(|source| TransportError::ConnectionFailed { address, source })
            }
            TcpMode::Server => {
                let listener = TcpListener::bind(address.as_str())
                    .await
                    .map_err(|source| TransportError::ConnectionFailed {
                        address: address.clone(),
                        source,
                    })?;
                debug!("tcp: listening on '{}'", address);
                let (stream, peer) = tokio::time::timeout(timeout, listener.accept())
                    .await
                    .map_err(|_| TransportError::Timeout(timeout))?
                    .map_err(|source| TransportError::ConnectionFailed { address, source })?;
                debug!("tcp: accepted peer {}", peer);
                Ok(stream)
            }
        }
    }
}

/// Socket errors that mean the peer is gone.
fn classify(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotConnected => TransportError::broken(err.to_string()),
        _ => TransportError::Io(err),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> &'static str {
        match self.config.mode {
            TcpMode::Client => "tcp-client",
            TcpMode::Server => "tcp-server",
        }
    }

    async fn connect(&self) -> Result<(), TransportError> {
        let stream = self.open_stream().await?;
        // Line-oriented traffic; don't let Nagle hold back short commands.
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        *self.reader.lock().await = Some(Reader {
            stream: read_half,
            lines: LineBuffer::with_ansi_stripping(self.config.strip_ansi),
        });
        *self.writer.lock().await = Some(write_half);

        info!("tcp: connected to '{}'", self.config.socket_addr());
        Ok(())
    }

    async fn send(&self, payload: &[u8], append_terminator: bool) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        writer.write_all(payload).await.map_err(classify)?;
        if append_terminator && !payload.is_empty() {
            writer
                .write_all(self.config.terminator.as_bytes())
                .await
                .map_err(classify)?;
        }
        writer.flush().await.map_err(classify)
    }

    async fn read(&self) -> Result<Option<String>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        if let Some(line) = reader.lines.next_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.stream.read(&mut chunk).await.map_err(classify)?;
        if n == 0 {
            return Err(TransportError::broken("socket connection broken"));
        }
        reader.lines.extend(&chunk[..n]);

        Ok(reader.lines.next_line())
    }

    async fn quit(&self) -> Result<(), TransportError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Peer may already be gone.
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
        Ok(())
    }
}
