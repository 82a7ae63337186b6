//! Connection tuning knobs.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConnectionError;
use crate::filter::DEFAULT_BACKTRACE_CAPACITY;

/// Receive loop and filter settings for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Idle sleep of the receive loop, in milliseconds.
    pub poll_interval_ms: u64,

    /// Lines a block-mode filter remembers.
    pub backtrace_capacity: usize,

    /// Unread results a continuous subscription can hold.
    pub queue_capacity: usize,

    /// Wait timeout used when a request doesn't set one, in milliseconds.
    /// Zero means "check once".
    pub default_timeout_ms: u64,
}

impl ConnectionConfig {
    /// Idle sleep of the receive loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Default wait timeout.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Reject settings the receive loop can't work with.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.backtrace_capacity == 0 {
            return Err(ConnectionError::InvalidConfig {
                message: "backtrace_capacity must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConnectionError::InvalidConfig {
                message: "queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
            backtrace_capacity: DEFAULT_BACKTRACE_CAPACITY,
            queue_capacity: 64,
            default_timeout_ms: 0,
        }
    }
}

/// Convert a duration to whole milliseconds, saturating.
pub(crate) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
