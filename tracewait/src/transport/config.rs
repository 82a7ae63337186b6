//! TCP transport configuration.

use std::time::Duration;

use serde::Deserialize;

/// Which side of the socket this transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpMode {
    /// Connect out to `address:port`.
    #[default]
    Client,

    /// Bind `address:port` and accept exactly one peer.
    Server,
}

/// Raw TCP connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Host to connect to, or interface to bind in server mode.
    pub address: String,

    /// TCP port (default: 12345).
    pub port: u16,

    /// Client or server.
    pub mode: TcpMode,

    /// Connect/accept timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Strip ANSI escape sequences from received data.
    pub strip_ansi: bool,

    /// Appended to sent payloads when a terminator is requested.
    pub terminator: String,
}

impl TcpConfig {
    /// Create a client configuration for `address:port`.
    pub fn client(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    /// Create a server configuration listening on `address:port`.
    pub fn server(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            mode: TcpMode::Server,
            ..Default::default()
        }
    }

    /// Get the socket address string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Connect/accept timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 12345,
            mode: TcpMode::Client,
            connect_timeout_ms: 10_000,
            strip_ansi: false,
            terminator: "\r\n".to_string(),
        }
    }
}
