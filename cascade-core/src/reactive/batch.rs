//! Batching
//!
//! A batch coalesces every observer triggered during its extent into one
//! deduplicated queue and runs that queue once, when the outermost batch
//! scope closes.
//!
//! # Ordering
//!
//! Queued observers run in descending priority; equal priorities run in the
//! order they were first queued. Memos carry a higher default priority than
//! plain effects, so derived values settle before their consumers observe
//! them.
//!
//! # Flushing
//!
//! The batch is taken out of the context before the queue runs. Writes made
//! by flushing observers therefore propagate inline (each in an implicit
//! batch of its own), and an observer that already re-ran inline is skipped
//! when its queued entry comes up because it is no longer due.

use std::cmp::Reverse;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Observer;
use super::{BatchId, ObserverId};

/// A deduplicated queue of triggered observers.
pub struct Batch {
    id: BatchId,
    queue: IndexMap<ObserverId, Arc<dyn Observer>>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self {
            id: BatchId::new(),
            queue: IndexMap::new(),
        }
    }

    /// Get the batch's unique ID.
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Number of distinct observers waiting for the flush.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue an observer. Returns false if it was already queued.
    pub(crate) fn enqueue(&mut self, observer: Arc<dyn Observer>) -> bool {
        let id = observer.observer_id();
        if self.queue.contains_key(&id) {
            return false;
        }
        self.queue.insert(id, observer);
        true
    }

    /// Drain the queue in flush order.
    pub(crate) fn take_queue(&mut self) -> Vec<Arc<dyn Observer>> {
        let mut observers: Vec<_> = std::mem::take(&mut self.queue).into_values().collect();
        // Stable sort keeps first-queued order among equal priorities.
        observers.sort_by_key(|observer| Reverse(observer.priority()));
        observers
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Run observers taken from a closed batch.
pub(crate) fn flush(id: BatchId, observers: Vec<Arc<dyn Observer>>) {
    if observers.is_empty() {
        return;
    }
    trace!(batch = %id, queued = observers.len(), "flushing batch");
    for observer in observers {
        observer.flush();
    }
}

/// Owns the ambient batch for the extent of one `batch()` call.
///
/// Dropping the scope without closing it (a panic in the body) discards
/// the queue instead of flushing it.
struct BatchScope {
    id: BatchId,
    closed: bool,
}

impl BatchScope {
    /// Open a new ambient batch, or return `None` if one is already open.
    fn open() -> Option<Self> {
        let batch = Batch::new();
        let id = batch.id();
        ReactiveContext::open_batch(batch).then_some(Self { id, closed: false })
    }

    fn close(mut self) {
        self.closed = true;
        if let Some(mut batch) = ReactiveContext::close_batch(self.id) {
            let observers = batch.take_queue();
            flush(self.id, observers);
        }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if !self.closed {
            ReactiveContext::close_batch(self.id);
        }
    }
}

/// Run `f` with effect triggers deferred until it returns.
///
/// If a batch is already open, `f` simply runs under it: batches do not nest
/// as separate flush units and an inner `batch` never flushes early.
///
/// ```rust,ignore
/// batch(|| {
///     a.set(1);
///     a.set(2);
/// });
/// // Effects depending on `a` ran once, observing 2.
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    match BatchScope::open() {
        Some(scope) => {
            let result = f();
            scope.close();
            result
        }
        None => f(),
    }
}

/// Check if a batch is currently open on this thread.
pub fn is_batching() -> bool {
    ReactiveContext::is_batching()
}
