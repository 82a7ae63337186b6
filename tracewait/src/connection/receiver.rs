//! Background receive loop: transport lines in, filter results out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::filter::FilterRegistry;
use crate::transport::Transport;

/// Connected/broken flag shared between the loop and the connection.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    connected: AtomicBool,
}

impl ConnectionState {
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    /// Returns whether the connection was up before.
    pub(crate) fn mark_broken(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }
}

/// The per-connection worker.
///
/// Pulls one line at a time from the transport and fans it out to every
/// active filter before reading the next, so all filters observe lines in
/// receive order. Runs until shutdown is signalled or the connection is
/// marked broken; it never restarts itself.
pub(crate) struct ReceiveLoop {
    name: String,
    transport: Arc<dyn Transport>,
    registry: Arc<FilterRegistry>,
    state: Arc<ConnectionState>,
    poll_interval: Duration,
}

impl ReceiveLoop {
    pub(crate) fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        registry: Arc<FilterRegistry>,
        state: Arc<ConnectionState>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            registry,
            state,
            poll_interval,
        }
    }

    /// Start the loop on the runtime.
    pub(crate) fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!("{}: receiver started ({})", self.name, self.transport.kind());

        while self.state.is_connected() {
            let polled = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                polled = self.transport.read() => polled,
            };

            match polled {
                Ok(Some(line)) if !line.is_empty() => {
                    self.dispatch(&line);
                    continue;
                }
                Ok(_) => {}
                Err(err) if err.is_broken() => {
                    info!("{}: {}", self.name, err);
                    self.state.mark_broken();
                    break;
                }
                Err(err) => warn!("{}: read failed: {}", self.name, err),
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!("{}: receiver terminated", self.name);
    }

    fn dispatch(&self, line: &str) {
        debug!("{}: {}", self.name, line);
        let delivered = self.registry.dispatch(line);
        if delivered > 0 {
            trace!("{}: line resolved {} filter(s)", self.name, delivered);
        }
    }
}
