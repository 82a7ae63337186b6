//! Transport layer: the line-stream capability the receive loop drives.
//!
//! A transport is anything that can be connected, written to, and polled
//! for one decoded line at a time. The core never looks below that line
//! boundary, so TCP, a serial port or a message broker all plug in the same
//! way. [`TcpTransport`] is the bundled implementation.

pub mod config;
mod line;
#[cfg(test)]
pub(crate) mod mock;
mod tcp;

pub use config::{TcpConfig, TcpMode};
pub use line::LineBuffer;
pub use tcp::TcpTransport;

use async_trait::async_trait;

use crate::error::TransportError;

/// Capability set every byte/line-stream endpoint provides.
///
/// Implementations take `&self` everywhere: the receive loop reads while
/// callers send concurrently, so transports keep their read and write
/// halves behind separate locks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in log output (e.g. `"tcp-client"`).
    fn kind(&self) -> &'static str;

    /// Perform the handshake.
    ///
    /// Failure here means no connection was established.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Write `payload`, followed by the line terminator if requested.
    async fn send(&self, payload: &[u8], append_terminator: bool) -> Result<(), TransportError>;

    /// Poll for the next complete line.
    ///
    /// `Ok(None)` means "no data this poll", not end of stream. An
    /// unrecoverable failure is reported as [`TransportError::Broken`];
    /// every other error is transient and the caller may retry.
    async fn read(&self) -> Result<Option<String>, TransportError>;

    /// Release the underlying resources. Safe to call more than once.
    async fn quit(&self) -> Result<(), TransportError>;
}
