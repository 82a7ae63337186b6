//! Error types for tracewait.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for tracewait operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Filter construction errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Connection-level errors
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Transport layer errors (socket setup, reads, writes).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to (or bind) the remote endpoint
    #[error("Connection failed to {address}: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The stream is unusable. Fatal for the receive loop.
    #[error("Broken connection: {reason}")]
    Broken { reason: String },

    /// Operation attempted before `connect()` or after `quit()`
    #[error("Transport not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Create a broken-connection error.
    pub fn broken(reason: impl Into<String>) -> Self {
        Self::Broken {
            reason: reason.into(),
        }
    }

    /// Whether this error means the connection is gone for good.
    ///
    /// Anything else is treated as transient by the receive loop.
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken { .. } | Self::NotConnected)
    }
}

/// Filter errors (pattern compilation).
#[derive(Error, Debug)]
pub enum FilterError {
    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Connection layer errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Connection is broken or was closed
    #[error("Connection not connected - call reconnect() first")]
    NotConnected,

    /// Invalid configuration in the connection builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A connection with this name is already registered
    #[error("The connection name '{name}' already exists")]
    NameInUse { name: String },

    /// No connection registered under this name
    #[error("The connection '{name}' hasn't been established")]
    UnknownConnection { name: String },

    /// Every attempt to match the pattern timed out
    #[error("Unable to match the pattern after {timeout:?} ({attempts} attempt(s))")]
    NoMatch { timeout: Duration, attempts: usize },
}

/// Result type alias using tracewait's Error.
pub type Result<T> = std::result::Result<T, Error>;
