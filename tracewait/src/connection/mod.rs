//! Connections: one transport, one receive loop, many concurrent waiters.
//!
//! A [`Connection`] owns its transport and a [`FilterRegistry`]. A
//! background task reads lines and fans them out to every registered
//! filter; callers register filters, optionally send a command, and wait
//! on their own filter's queue. Callers never read from the transport
//! themselves.

mod builder;
pub mod config;
mod manager;
mod receiver;
mod request;

pub use builder::ConnectionBuilder;
pub use config::ConnectionConfig;
pub use manager::ConnectionManager;
pub use request::WaitRequest;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, FilterError, Result};
use crate::filter::{FilterHandle, FilterRegistry, FilterSpec, Subscription, TraceMatch};
use crate::transport::Transport;
use receiver::{ConnectionState, ReceiveLoop};

/// Handle on a running receive loop.
struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A live line-stream connection.
///
/// All operations take `&self`; share the connection between tasks with an
/// `Arc` (or borrow it into `tokio::join!`) to run waits concurrently.
pub struct Connection {
    /// Name used in log output.
    name: String,

    /// The underlying transport, shared with the receive loop.
    transport: Arc<dyn Transport>,

    /// Active filters.
    registry: Arc<FilterRegistry>,

    /// Connected/broken flag.
    state: Arc<ConnectionState>,

    /// Settings this connection was opened with.
    config: ConnectionConfig,

    /// The receive loop, while running.
    worker: Mutex<Option<Worker>>,
}

impl Connection {
    /// Connect `transport` and start the receive loop.
    ///
    /// Prefer [`ConnectionBuilder`], which validates the configuration.
    pub async fn open(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let name = name.into();
        transport.connect().await?;

        let connection = Self {
            registry: Arc::new(FilterRegistry::new(config.backtrace_capacity)),
            state: Arc::new(ConnectionState::default()),
            name,
            transport,
            config,
            worker: Mutex::new(None),
        };
        connection.state.mark_connected();
        connection.start_receiver();

        info!(
            "{}: connected ({})",
            connection.name,
            connection.transport.kind()
        );
        Ok(connection)
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_receiver(&self) {
        let (shutdown, signal) = watch::channel(false);
        let handle = ReceiveLoop::new(
            self.name.clone(),
            self.transport.clone(),
            self.registry.clone(),
            self.state.clone(),
            self.config.poll_interval(),
        )
        .spawn(signal);

        if let Some(stale) = self.worker().replace(Worker { shutdown, handle }) {
            stale.handle.abort();
        }
    }

    async fn stop_receiver(&self) {
        let worker = self.worker().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown.send(true);
            if let Err(err) = worker.handle.await {
                warn!("{}: receiver ended abnormally: {}", self.name, err);
            }
        }
    }

    /// Get the connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the connection is usable.
    ///
    /// Turns false once the transport reports a broken connection, a send
    /// fails, or [`quit`](Self::quit) is called.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Get the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the filter registry.
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Short name of the transport type.
    pub fn transport_kind(&self) -> &'static str {
        self.transport.kind()
    }

    /// Send a command followed by the line terminator.
    pub async fn send(&self, command: &str) -> Result<()> {
        self.send_bytes(command.as_bytes(), true).await
    }

    /// Send raw bytes.
    ///
    /// A failed write marks the connection broken.
    pub async fn send_bytes(&self, payload: &[u8], append_terminator: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected.into());
        }

        debug!(
            "{}: sending: '{}'",
            self.name,
            String::from_utf8_lossy(payload)
        );
        if let Err(err) = self.transport.send(payload, append_terminator).await {
            if self.state.mark_broken() {
                warn!("{}: send failed, connection marked broken: {}", self.name, err);
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Transmit as part of a wait. Failures are logged, never returned:
    /// the wait goes on and simply times out.
    async fn transmit(&self, command: &str, append_terminator: bool) {
        if let Err(err) = self.send_bytes(command.as_bytes(), append_terminator).await {
            error!("{}: could not send '{}': {}", self.name, command, err);
        }
    }

    /// Register a long-lived filter.
    ///
    /// The filter stays active across any number of
    /// [`wait_on`](Self::wait_on) calls until the subscription is closed,
    /// dropped, or deactivated by handle.
    pub fn activate_filter(&self, spec: FilterSpec) -> Subscription {
        self.registry.subscribe(spec, self.config.queue_capacity)
    }

    /// Remove a filter by handle.
    ///
    /// Returns `false` if it was already removed.
    pub fn deactivate_filter(&self, handle: FilterHandle) -> bool {
        self.registry.deactivate(handle)
    }

    /// Register a filter, optionally send a command, and wait for a match.
    ///
    /// Returns `None` when the timeout elapses, or when a block closes
    /// without matching. The filter is removed before this returns, and
    /// also if the future is dropped mid-wait.
    pub async fn wait_for_pattern(&self, request: WaitRequest) -> Option<TraceMatch> {
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());
        let mut subscription = self.registry.subscribe(request.filter, 1);
        debug!(
            "{}: filter {} waiting up to {:?}",
            self.name,
            subscription.handle(),
            timeout
        );

        if let Some(command) = &request.command {
            self.transmit(command, request.append_terminator).await;
        }

        let event = subscription.recv_timeout(timeout).await;
        subscription.close();

        match event {
            Some(event) => event.matched,
            None => {
                debug!("{}: no match within {:?}", self.name, timeout);
                None
            }
        }
    }

    /// Wait for a single line matching `pattern`.
    pub async fn wait_for(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<TraceMatch>, FilterError> {
        let request = WaitRequest::simple(pattern)?.with_timeout(timeout);
        Ok(self.wait_for_pattern(request).await)
    }

    /// Optionally send a command, then wait on an existing subscription.
    ///
    /// Unlike [`wait_for_pattern`](Self::wait_for_pattern) no filter is
    /// created or removed; results that arrived since the last call are
    /// returned first.
    pub async fn wait_on(
        &self,
        subscription: &mut Subscription,
        timeout: Duration,
        command: Option<&str>,
    ) -> Option<TraceMatch> {
        if let Some(command) = command {
            self.transmit(command, true).await;
        }
        Self::next_match(subscription, timeout).await
    }

    /// Like [`wait_on`](Self::wait_on), sending `command` as-is unless
    /// `append_terminator` is set.
    pub async fn wait_on_raw(
        &self,
        subscription: &mut Subscription,
        timeout: Duration,
        command: &str,
        append_terminator: bool,
    ) -> Option<TraceMatch> {
        self.transmit(command, append_terminator).await;
        Self::next_match(subscription, timeout).await
    }

    async fn next_match(subscription: &mut Subscription, timeout: Duration) -> Option<TraceMatch> {
        subscription
            .recv_timeout(timeout)
            .await
            .and_then(|event| event.matched)
    }

    /// Repeat [`wait_for_pattern`](Self::wait_for_pattern) up to `attempts`
    /// times, resending the command each time.
    pub async fn wait_for_pattern_retry(
        &self,
        request: WaitRequest,
        attempts: usize,
    ) -> Result<TraceMatch> {
        let attempts = attempts.max(1);
        let timeout = request.timeout.unwrap_or_else(|| self.config.default_timeout());

        for attempt in 1..=attempts {
            if let Some(found) = self.wait_for_pattern(request.clone()).await {
                return Ok(found);
            }
            warn!(
                "{}: attempt {}/{} to match '{}' failed",
                self.name,
                attempt,
                attempts,
                request.filter.pattern().as_str()
            );
        }

        Err(ConnectionError::NoMatch { timeout, attempts }.into())
    }

    /// Re-run the transport handshake and restart the receive loop.
    ///
    /// Registered filters are kept.
    pub async fn reconnect(&self) -> Result<()> {
        self.stop_receiver().await;
        self.state.mark_broken();
        if let Err(err) = self.transport.quit().await {
            debug!("{}: releasing old transport failed: {}", self.name, err);
        }

        self.transport.connect().await?;
        self.state.mark_connected();
        self.start_receiver();

        info!("{}: reconnected", self.name);
        Ok(())
    }

    /// Stop the receive loop and release the transport.
    ///
    /// Safe to call more than once.
    pub async fn quit(&self) -> Result<()> {
        self.stop_receiver().await;
        if self.state.mark_broken() {
            info!("{}: closing", self.name);
        }
        self.transport.quit().await?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(worker) = self.worker().take() {
            worker.handle.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("transport", &self.transport.kind())
            .field("connected", &self.is_connected())
            .field("filters", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::error::Error;
    use crate::transport::mock::ScriptedTransport;

    async fn open(transport: &Arc<ScriptedTransport>) -> Connection {
        let _ = env_logger::builder().is_test(true).try_init();
        ConnectionBuilder::new("dut")
            .poll_interval(Duration::from_millis(1))
            .shared_transport(transport.clone())
            .open()
            .await
            .unwrap()
    }

    async fn until_broken(connection: &Connection) {
        for _ in 0..200 {
            if !connection.is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never broke");
    }

    #[tokio::test]
    async fn test_simple_match_after_command() {
        let transport = ScriptedTransport::new();
        transport.reply_to("get value", &["ready", "value=42"]);
        let connection = open(&transport).await;

        let request = WaitRequest::simple(r"value=(\d+)")
            .unwrap()
            .with_timeout(Duration::from_secs(2))
            .send("get value");
        let found = connection.wait_for_pattern(request).await.unwrap();

        assert_eq!(found.get(1), Some("42"));
        assert_eq!(found.haystack(), "value=42");
        assert_eq!(transport.sent(), vec!["get value".to_string()]);
        assert!(connection.registry().is_empty());
    }

    #[tokio::test]
    async fn test_block_match() {
        let transport = ScriptedTransport::new();
        transport.reply_to("dump", &["A", "B", "END"]);
        let connection = open(&transport).await;

        let request = WaitRequest::block(r"A\r\nB", "^END$", ".*")
            .unwrap()
            .with_timeout(Duration::from_secs(2))
            .send("dump");
        let found = connection.wait_for_pattern(request).await.unwrap();

        assert_eq!(found.as_str(), "A\r\nB");
        assert!(connection.registry().is_empty());
    }

    #[tokio::test]
    async fn test_zero_timeout_returns_immediately() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        let start = Instant::now();
        let found = connection.wait_for("anything", Duration::ZERO).await.unwrap();

        assert!(found.is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(connection.registry().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_match() {
        let transport = ScriptedTransport::new();
        transport.reply_to("status", &["busy"]);
        let connection = open(&transport).await;

        let request = WaitRequest::simple("^idle$")
            .unwrap()
            .with_timeout(Duration::from_millis(50))
            .send("status");

        assert!(connection.wait_for_pattern(request).await.is_none());
        assert!(connection.registry().is_empty());
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_send_failure_still_waits_and_cleans_up() {
        let transport = ScriptedTransport::new();
        transport.fail_sends(true);
        let connection = open(&transport).await;

        let request = WaitRequest::simple("ok")
            .unwrap()
            .with_timeout(Duration::from_millis(50))
            .send("status");
        let start = Instant::now();

        assert!(connection.wait_for_pattern(request).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(connection.registry().is_empty());
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_concurrent_waits_are_isolated() {
        let transport = ScriptedTransport::new();
        transport.reply_to("read sensors", &["temp=21", "volt=12"]);
        let connection = open(&transport).await;

        let temp = WaitRequest::simple(r"^temp=(\d+)$")
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let volt = WaitRequest::simple(r"^volt=(\d+)$")
            .unwrap()
            .with_timeout(Duration::from_secs(2))
            .send("read sensors");

        let (temp, volt) = tokio::join!(
            connection.wait_for_pattern(temp),
            connection.wait_for_pattern(volt)
        );

        assert_eq!(temp.unwrap().haystack(), "temp=21");
        assert_eq!(volt.unwrap().haystack(), "volt=12");
        assert!(connection.registry().is_empty());
    }

    #[tokio::test]
    async fn test_broken_connection_times_out_pending_wait() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        let waiting = connection.wait_for("late", Duration::from_millis(200));
        let breaking = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            transport.push_broken();
            transport.push_line("late");
        };
        let (found, ()) = tokio::join!(waiting, breaking);

        assert!(found.unwrap().is_none());
        assert!(!connection.is_connected());
        assert!(matches!(
            connection.send("x").await,
            Err(Error::Connection(ConnectionError::NotConnected))
        ));
    }

    #[tokio::test]
    async fn test_empty_lines_are_not_dispatched() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;
        let mut subscription = connection.activate_filter(FilterSpec::simple("^$").unwrap());

        transport.push_lines(&["", "", "x"]);
        let found = connection
            .wait_on(&mut subscription, Duration::from_millis(50), None)
            .await;

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_continuous_filter_across_waits() {
        let transport = ScriptedTransport::new();
        transport.reply_to("tick", &["tick 1", "tick 2"]);
        let connection = open(&transport).await;

        let mut subscription = connection.activate_filter(FilterSpec::simple(r"tick (\d)").unwrap());
        let handle = subscription.handle();

        let first = connection
            .wait_on(&mut subscription, Duration::from_secs(1), Some("tick"))
            .await
            .unwrap();
        let second = connection
            .wait_on(&mut subscription, Duration::from_secs(1), None)
            .await
            .unwrap();

        assert_eq!(first.get(1), Some("1"));
        assert_eq!(second.get(1), Some("2"));
        assert!(connection.registry().contains(handle));

        assert!(connection.deactivate_filter(handle));
        assert!(!connection.deactivate_filter(handle));
        assert!(!subscription.close());
    }

    #[tokio::test]
    async fn test_wait_on_without_terminator() {
        let transport = ScriptedTransport::new();
        transport.reply_to("\x03", &["^C", "prompt>"]);
        let connection = open(&transport).await;

        let mut prompt = connection.activate_filter(FilterSpec::simple("^prompt>$").unwrap());
        let found = connection
            .wait_on_raw(&mut prompt, Duration::from_secs(1), "\x03", false)
            .await;
        connection
            .wait_on(&mut prompt, Duration::ZERO, Some("status"))
            .await;

        assert_eq!(found.unwrap().as_str(), "prompt>");
        assert_eq!(transport.sent(), vec!["\x03".to_string(), "status".to_string()]);
        assert_eq!(transport.terminators(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_later_attempt() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        let request = WaitRequest::simple("^pong$")
            .unwrap()
            .with_timeout(Duration::from_millis(100));
        let late_reply = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            transport.push_line("pong");
        };

        let (found, ()) = tokio::join!(connection.wait_for_pattern_retry(request, 3), late_reply);
        assert_eq!(found.unwrap().as_str(), "pong");
        assert!(connection.registry().is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        let request = WaitRequest::simple("^pong$")
            .unwrap()
            .with_timeout(Duration::from_millis(20))
            .send("ping");
        let result = connection.wait_for_pattern_retry(request, 2).await;

        assert!(matches!(
            result,
            Err(Error::Connection(ConnectionError::NoMatch { attempts: 2, .. }))
        ));
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_after_broken() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        transport.push_broken();
        until_broken(&connection).await;

        connection.reconnect().await.unwrap();
        assert!(connection.is_connected());
        assert_eq!(transport.connect_count(), 2);

        transport.reply_to("hello", &["world"]);
        let request = WaitRequest::simple("world")
            .unwrap()
            .with_timeout(Duration::from_secs(1))
            .send("hello");
        assert!(connection.wait_for_pattern(request).await.is_some());
    }

    #[tokio::test]
    async fn test_quit_is_idempotent() {
        let transport = ScriptedTransport::new();
        let connection = open(&transport).await;

        connection.quit().await.unwrap();
        connection.quit().await.unwrap();

        assert!(!connection.is_connected());
        assert_eq!(transport.quit_count(), 2);
        assert!(connection.send("x").await.is_err());
    }

    #[tokio::test]
    async fn test_default_timeout_from_config() {
        let transport = ScriptedTransport::new();
        let connection = ConnectionBuilder::new("dut")
            .poll_interval(Duration::from_millis(1))
            .default_timeout(Duration::from_secs(1))
            .shared_transport(transport.clone())
            .open()
            .await
            .unwrap();
        transport.reply_to("ver", &["v1.2"]);

        let request = WaitRequest::simple(r"v(\d)\.(\d)").unwrap().send("ver");
        let found = connection.wait_for_pattern(request).await.unwrap();
        assert_eq!(found.get(2), Some("2"));
    }
}
