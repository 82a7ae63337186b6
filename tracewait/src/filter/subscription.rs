//! Reader side of a registered filter.

use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::mpsc;

use super::registry::FilterRegistry;
use super::{FilterEvent, FilterHandle};

/// Handle to an active filter and its result queue.
///
/// Dropping the subscription removes the filter from its registry, so a
/// filter cannot outlive the code waiting on it. It can also be consumed
/// as a [`Stream`] of results for long-lived filtering.
pub struct Subscription {
    handle: FilterHandle,
    events: mpsc::Receiver<FilterEvent>,
    registry: Weak<FilterRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        handle: FilterHandle,
        events: mpsc::Receiver<FilterEvent>,
        registry: Weak<FilterRegistry>,
    ) -> Self {
        Self {
            handle,
            events,
            registry,
        }
    }

    /// Get the filter handle.
    pub fn handle(&self) -> FilterHandle {
        self.handle
    }

    /// Take a queued result without waiting.
    pub fn try_recv(&mut self) -> Option<FilterEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next result.
    ///
    /// A zero timeout checks the queue once and returns immediately.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<FilterEvent> {
        if timeout.is_zero() {
            return self.try_recv();
        }
        tokio::time::timeout(timeout, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Remove the filter from its registry.
    ///
    /// Returns `false` if it was already removed.
    pub fn close(self) -> bool {
        self.deactivate()
    }

    fn deactivate(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.deactivate(self.handle))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl Stream for Subscription {
    type Item = FilterEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
