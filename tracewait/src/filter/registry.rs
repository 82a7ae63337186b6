//! Registry of active filters, owned by a connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use log::{debug, trace};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::backtrace::{BackTrace, DEFAULT_BACKTRACE_CAPACITY};
use super::subscription::Subscription;
use super::{FilterEvent, FilterHandle, FilterMode, FilterSpec, TraceMatch};

/// A registered filter plus its per-filter state.
struct TraceFilter {
    spec: FilterSpec,
    backtrace: BackTrace,
    queue: mpsc::Sender<FilterEvent>,
}

impl TraceFilter {
    /// Feed one line. Returns the resolution when the filter fires.
    fn evaluate(&mut self, line: &str) -> Option<Option<TraceMatch>> {
        match &self.spec.mode {
            FilterMode::Simple => TraceMatch::capture(&self.spec.pattern, line).map(Some),
            FilterMode::Block {
                end_of_block,
                line_filter,
            } => {
                // Append before the end-of-block test: the closing line is
                // part of the block when it passes the line filter.
                if line_filter.is_match(line) {
                    self.backtrace.push(line);
                }
                if !end_of_block.is_match(line) {
                    return None;
                }
                let block = self.backtrace.joined();
                self.backtrace.clear();
                Some(TraceMatch::capture(&self.spec.pattern, &block))
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Last handle issued. Only ever grows.
    last_handle: u64,
    filters: IndexMap<FilterHandle, TraceFilter>,
}

/// Thread-safe set of active filters.
///
/// The lock is held only while registering, removing, or fanning a single
/// line out to every filter; it is never held across an await point.
pub struct FilterRegistry {
    inner: Mutex<Inner>,
    backtrace_capacity: usize,
}

impl FilterRegistry {
    /// Create an empty registry whose block filters keep at most
    /// `backtrace_capacity` lines.
    pub fn new(backtrace_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            backtrace_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-dispatch leaves the map itself consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a filter and return its handle and result queue.
    ///
    /// `queue_capacity` bounds how many unread results the filter holds;
    /// further hits are dropped until the reader catches up. Public callers
    /// go through [`subscribe`](Self::subscribe), whose [`Subscription`]
    /// removes the filter when dropped.
    pub(crate) fn activate(
        &self,
        spec: FilterSpec,
        queue_capacity: usize,
    ) -> (FilterHandle, mpsc::Receiver<FilterEvent>) {
        let (queue, events) = mpsc::channel(queue_capacity.max(1));
        let filter = TraceFilter {
            spec,
            backtrace: BackTrace::new(self.backtrace_capacity),
            queue,
        };

        let mut inner = self.lock();
        inner.last_handle += 1;
        let handle = FilterHandle::new(inner.last_handle);
        inner.filters.insert(handle, filter);
        drop(inner);

        debug!("filter {} activated", handle);
        (handle, events)
    }

    /// Register a filter wrapped in a [`Subscription`] that removes it again
    /// when dropped.
    pub fn subscribe(self: &Arc<Self>, spec: FilterSpec, queue_capacity: usize) -> Subscription {
        let (handle, events) = self.activate(spec, queue_capacity);
        Subscription::new(handle, events, Arc::downgrade(self))
    }

    /// Remove a filter.
    ///
    /// Returns `false` if the handle is unknown or was already removed.
    pub fn deactivate(&self, handle: FilterHandle) -> bool {
        let removed = self.lock().filters.shift_remove(&handle).is_some();
        if removed {
            debug!("filter {} deactivated", handle);
        }
        removed
    }

    /// Evaluate every active filter against `line`.
    ///
    /// Returns how many results were queued. A result for a filter whose
    /// queue is full is dropped. A filter whose reader is gone is removed.
    pub fn dispatch(&self, line: &str) -> usize {
        let mut inner = self.lock();
        let mut delivered = 0;
        let mut orphaned = Vec::new();

        for (handle, filter) in inner.filters.iter_mut() {
            if filter.queue.is_closed() {
                orphaned.push(*handle);
                continue;
            }
            let Some(matched) = filter.evaluate(line) else {
                continue;
            };
            match filter.queue.try_send(FilterEvent::new(matched)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!("filter {}: result dropped, queue full", handle);
                }
                Err(TrySendError::Closed(_)) => orphaned.push(*handle),
            }
        }

        for handle in orphaned {
            inner.filters.shift_remove(&handle);
            debug!("filter {} removed, reader gone", handle);
        }

        delivered
    }

    /// Check if a handle is currently registered.
    pub fn contains(&self, handle: FilterHandle) -> bool {
        self.lock().filters.contains_key(&handle)
    }

    /// Number of active filters.
    pub fn len(&self) -> usize {
        self.lock().filters.len()
    }

    /// Check if no filter is active.
    pub fn is_empty(&self) -> bool {
        self.lock().filters.is_empty()
    }

    /// Block-mode back-trace capacity for new filters.
    pub fn backtrace_capacity(&self) -> usize {
        self.backtrace_capacity
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BACKTRACE_CAPACITY)
    }
}
