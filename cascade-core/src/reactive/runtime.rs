//! Reactive Runtime
//!
//! The runtime owns the signal channel: a process-wide table mapping each
//! signal id to the observers (effects and links) subscribed to it.
//!
//! # How It Works
//!
//! 1. When an effect finishes a run, it diffs the signals it read against
//!    its previous subscriptions and subscribes/unsubscribes accordingly.
//!
//! 2. When a signal's value changes (or it is touched), the runtime:
//!    a. Snapshots the observers subscribed to that signal id
//!    b. Notifies each of them inside a batch, which queues them
//!    c. Flushes the batch when its outermost scope closes, in descending
//!       priority order
//!
//! 3. When a signal is destroyed, its channel entry is removed and every
//!    observer is told so it can drop the dependency (and self-destroy once
//!    nothing can trigger it any more).
//!
//! # Ownership
//!
//! The channel holds observers strongly: an effect stays alive for as long
//! as something can trigger it, regardless of whether a handle to it is
//! still held. Destruction is always explicit or cascading.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use super::batch::batch;
use super::context::ReactiveContext;
use super::{ObserverId, SignalId};

/// The kind of emission published on the signal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    /// The stored value changed according to the signal's comparator.
    Value,
    /// The value was force-propagated without changing.
    Touch,
}

/// Anything that can sit on the signal channel and in a batch queue.
pub(crate) trait Observer: Send + Sync {
    /// Get the observer's unique ID.
    fn observer_id(&self) -> ObserverId;

    /// Higher priorities run first when a batch flushes.
    fn priority(&self) -> i32;

    /// A subscribed signal emitted. Implementations mark themselves due and
    /// queue themselves on the open batch.
    fn notify(&self, signal: SignalId, change: Change);

    /// Called once per batch flush for every queued observer.
    fn flush(&self);

    /// A subscribed signal was destroyed.
    fn signal_destroyed(&self, signal: SignalId);
}

type Channel = HashMap<SignalId, IndexMap<ObserverId, Arc<dyn Observer>>>;

/// The global reactive runtime.
///
/// This is a singleton that routes signal emissions to observers.
pub struct Runtime;

static CHANNEL: OnceLock<RwLock<Channel>> = OnceLock::new();

fn channel() -> &'static RwLock<Channel> {
    CHANNEL.get_or_init(|| RwLock::new(HashMap::new()))
}

impl Runtime {
    /// Record that an observer depends on a signal.
    ///
    /// Observers are notified in subscription order.
    pub(crate) fn subscribe(signal_id: SignalId, observer: Arc<dyn Observer>) {
        channel()
            .write()
            .entry(signal_id)
            .or_default()
            .insert(observer.observer_id(), observer);
    }

    /// Remove a single subscription.
    pub(crate) fn unsubscribe(signal_id: SignalId, observer_id: ObserverId) {
        let mut channel = channel().write();
        if let Some(observers) = channel.get_mut(&signal_id) {
            observers.shift_remove(&observer_id);
            if observers.is_empty() {
                channel.remove(&signal_id);
            }
        }
    }

    /// Publish an emission for `signal_id`.
    ///
    /// This is the core update propagation mechanism. Outside a batch the
    /// emission opens one of its own, so every observer triggered by this
    /// write has run by the time this returns.
    pub(crate) fn emit(signal_id: SignalId, change: Change) {
        let observers = Self::observers(signal_id);
        if observers.is_empty() {
            return;
        }

        trace!(signal = %signal_id, ?change, observers = observers.len(), "signal emitted");

        batch(|| {
            for observer in observers {
                observer.notify(signal_id, change);
            }
        });
    }

    /// Tear down the channel entry of a destroyed signal.
    pub(crate) fn signal_destroyed(signal_id: SignalId) {
        let observers = channel().write().remove(&signal_id).unwrap_or_default();
        for observer in observers.into_values() {
            observer.signal_destroyed(signal_id);
        }
    }

    /// Snapshot of the observers of a signal, lock released.
    fn observers(signal_id: SignalId) -> Vec<Arc<dyn Observer>> {
        channel()
            .read()
            .get(&signal_id)
            .map(|observers| observers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of observers subscribed to a signal.
    pub fn subscriber_count(signal_id: SignalId) -> usize {
        channel()
            .read()
            .get(&signal_id)
            .map_or(0, IndexMap::len)
    }

    /// Check whether a particular observer is subscribed to a signal.
    pub fn is_subscribed(signal_id: SignalId, observer_id: ObserverId) -> bool {
        channel()
            .read()
            .get(&signal_id)
            .is_some_and(|observers| observers.contains_key(&observer_id))
    }

    /// Check if signal reads on this thread currently register dependencies.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

    struct MockObserver {
        id: ObserverId,
        priority: i32,
        notified: AtomicI32,
        flushed: AtomicI32,
        destroyed: AtomicBool,
        log: Option<Arc<Mutex<Vec<i32>>>>,
    }

    impl MockObserver {
        fn new(priority: i32, log: Option<Arc<Mutex<Vec<i32>>>>) -> Arc<Self> {
            Arc::new(Self {
                id: ObserverId::new(),
                priority,
                notified: AtomicI32::new(0),
                flushed: AtomicI32::new(0),
                destroyed: AtomicBool::new(false),
                log,
            })
        }
    }

    struct Queued(Arc<MockObserver>);

    impl Observer for Queued {
        fn observer_id(&self) -> ObserverId {
            self.0.id
        }

        fn priority(&self) -> i32 {
            self.0.priority
        }

        fn notify(&self, _signal: SignalId, _change: Change) {
            self.0.notified.fetch_add(1, Ordering::SeqCst);
            let me: Arc<dyn Observer> = Arc::new(Queued(self.0.clone()));
            ReactiveContext::enqueue(me);
        }

        fn flush(&self) {
            self.0.flushed.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.0.log {
                log.lock().push(self.0.priority);
            }
        }

        fn signal_destroyed(&self, _signal: SignalId) {
            self.0.destroyed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let signal = SignalId::new();
        let mock = MockObserver::new(0, None);

        Runtime::subscribe(signal, Arc::new(Queued(mock.clone())));
        assert_eq!(Runtime::subscriber_count(signal), 1);

        Runtime::emit(signal, Change::Value);

        assert_eq!(mock.notified.load(Ordering::SeqCst), 1);
        assert_eq!(mock.flushed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runtime_flushes_in_priority_order() {
        let signal = SignalId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for priority in [-100, 1000, 0] {
            let mock = MockObserver::new(priority, Some(log.clone()));
            Runtime::subscribe(signal, Arc::new(Queued(mock)));
        }

        Runtime::emit(signal, Change::Touch);

        assert_eq!(*log.lock(), vec![1000, 0, -100]);
    }

    #[test]
    fn runtime_unsubscribes() {
        let signal = SignalId::new();
        let mock = MockObserver::new(0, None);

        Runtime::subscribe(signal, Arc::new(Queued(mock.clone())));
        assert!(Runtime::is_subscribed(signal, mock.id));

        Runtime::unsubscribe(signal, mock.id);
        assert!(!Runtime::is_subscribed(signal, mock.id));

        Runtime::emit(signal, Change::Value);
        assert_eq!(mock.notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn runtime_reports_destroyed_signals() {
        let signal = SignalId::new();
        let mock = MockObserver::new(0, None);

        Runtime::subscribe(signal, Arc::new(Queued(mock.clone())));
        Runtime::signal_destroyed(signal);

        assert!(mock.destroyed.load(Ordering::SeqCst));
        assert_eq!(Runtime::subscriber_count(signal), 0);
    }
}
