//! Parameters of a send-then-wait rendezvous.

use std::time::Duration;

use crate::error::FilterError;
use crate::filter::FilterSpec;

/// What to wait for, how long, and what to send first.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tracewait::WaitRequest;
///
/// let request = WaitRequest::simple(r"value=(\d+)")?
///     .with_timeout(Duration::from_secs(2))
///     .send("get value");
/// # Ok::<(), tracewait::error::FilterError>(())
/// ```
#[derive(Debug, Clone)]
pub struct WaitRequest {
    /// The filter registered for the duration of the wait.
    pub filter: FilterSpec,

    /// How long to wait; `None` uses the connection's default.
    pub timeout: Option<Duration>,

    /// Command transmitted after the filter is registered.
    pub command: Option<String>,

    /// Whether the transport's line terminator follows the command.
    pub append_terminator: bool,
}

impl WaitRequest {
    /// Wait for a result of `filter`.
    pub fn new(filter: FilterSpec) -> Self {
        Self {
            filter,
            timeout: None,
            command: None,
            append_terminator: true,
        }
    }

    /// Wait for a single line matching `pattern`.
    pub fn simple(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self::new(FilterSpec::simple(pattern)?))
    }

    /// Wait for a block match. See [`FilterSpec::block`].
    pub fn block(pattern: &str, end_of_block: &str, line_filter: &str) -> Result<Self, FilterError> {
        Ok(Self::new(FilterSpec::block(pattern, end_of_block, line_filter)?))
    }

    /// Set the wait timeout. Zero checks once without waiting.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Transmit `command` before waiting.
    pub fn send(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Transmit the command as-is, without a line terminator.
    pub fn without_terminator(mut self) -> Self {
        self.append_terminator = false;
        self
    }
}
