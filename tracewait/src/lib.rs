//! # Tracewait
//!
//! Async send-then-wait pattern matching over line-oriented byte streams.
//!
//! Tracewait keeps one background receive loop per connection that splits
//! the incoming stream into lines and fans every line out to all active
//! filters. Any number of tasks can wait on the same connection at once,
//! each for its own regular expression, without stealing lines from each
//! other.
//!
//! ## Features
//!
//! - Concurrent waiters on one connection, each seeing every line
//! - Single-line matches or multi-line blocks delimited by an end pattern
//! - Command transmission that can't race its response
//! - Long-lived subscriptions usable as a `Stream`
//! - Raw TCP transport (client or server) with optional ANSI stripping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tracewait::{ConnectionBuilder, TcpConfig, WaitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tracewait::Error> {
//!     let connection = ConnectionBuilder::new("dut")
//!         .tcp(TcpConfig::client("192.168.1.1", 12345))
//!         .open()
//!         .await?;
//!
//!     let request = WaitRequest::simple(r"value=(\d+)")?
//!         .with_timeout(Duration::from_secs(2))
//!         .send("get value");
//!
//!     if let Some(found) = connection.wait_for_pattern(request).await {
//!         println!("value is {:?}", found.get(1));
//!     }
//!
//!     connection.quit().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod filter;
pub mod transport;

// Re-export main types for convenience
pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, ConnectionManager, WaitRequest};
pub use error::Error;
pub use filter::{
    FilterEvent, FilterHandle, FilterMode, FilterRegistry, FilterSpec, Subscription, TraceMatch,
};
pub use transport::{TcpConfig, TcpMode, TcpTransport, Transport};
