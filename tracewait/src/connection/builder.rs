//! Builder for opening connections.

use std::sync::Arc;
use std::time::Duration;

use super::Connection;
use super::config::{ConnectionConfig, as_millis};
use crate::error::{ConnectionError, Result};
use crate::transport::{TcpConfig, TcpTransport, Transport};

/// Builder for constructing connections.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tracewait::{ConnectionBuilder, TcpConfig};
///
/// # async fn example() -> Result<(), tracewait::Error> {
/// let connection = ConnectionBuilder::new("dut")
///     .tcp(TcpConfig::client("192.168.1.1", 12345))
///     .default_timeout(Duration::from_secs(5))
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionBuilder {
    name: String,
    config: ConnectionConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl ConnectionBuilder {
    /// Create a builder for a connection called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ConnectionConfig::default(),
            transport: None,
        }
    }

    /// Get the connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the receive loop's idle sleep (default: 5ms).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = as_millis(interval);
        self
    }

    /// Set how many lines block-mode filters remember (default: 500).
    pub fn backtrace_capacity(mut self, capacity: usize) -> Self {
        self.config.backtrace_capacity = capacity;
        self
    }

    /// Set how many unread results a subscription holds (default: 64).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the timeout used by requests that don't specify one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout_ms = as_millis(timeout);
        self
    }

    /// Use `transport` for this connection.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Use an already shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a raw TCP transport.
    pub fn tcp(self, config: TcpConfig) -> Self {
        self.transport(TcpTransport::new(config))
    }

    /// Connect the transport and start the receive loop.
    pub async fn open(self) -> Result<Connection> {
        self.config.validate()?;
        let transport = self.transport.ok_or_else(|| ConnectionError::InvalidConfig {
            message: "a transport is required".to_string(),
        })?;

        Connection::open(self.name, transport, self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_missing_transport() {
        let result = ConnectionBuilder::new("dut").open().await;
        assert!(matches!(
            result,
            Err(Error::Connection(ConnectionError::InvalidConfig { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_capacity() {
        let result = ConnectionBuilder::new("dut")
            .tcp(TcpConfig::default())
            .queue_capacity(0)
            .open()
            .await;
        assert!(matches!(
            result,
            Err(Error::Connection(ConnectionError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_setters() {
        let builder = ConnectionBuilder::new("dut")
            .poll_interval(Duration::from_millis(2))
            .backtrace_capacity(10)
            .default_timeout(Duration::from_secs(3));
        assert_eq!(builder.name(), "dut");
        assert_eq!(builder.config.poll_interval_ms, 2);
        assert_eq!(builder.config.backtrace_capacity, 10);
        assert_eq!(builder.config.default_timeout_ms, 3000);
    }
}
