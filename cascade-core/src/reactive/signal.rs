//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! publishes a notification on the signal channel whenever that value
//! changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while an effect is running, the read is
//!    recorded as a dependency of that effect.
//!
//! 2. When a signal is written, its comparator decides whether the value
//!    changed. Only a change (or an explicit touch) is published.
//!
//! 3. Publication triggers every effect and link subscribed to the signal,
//!    deferred to the end of the open batch if there is one.
//!
//! # Lifecycle
//!
//! A muted signal still stores writes but publishes nothing. A destroyed
//! signal keeps returning its last value, ignores writes and never
//! registers as a dependency again.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::hooks::{DestroyHook, DestroyHooks};
use super::runtime::{Change, Runtime};
use super::SignalId;

/// Decides whether a write is a change: `compare(old, new)` returns true
/// when the new value differs.
pub type CompareFn<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Runs before every read of the signal.
pub type BeforeReadFn = Arc<dyn Fn() + Send + Sync>;

/// A deferred initial value, computed on first read.
pub type LazyFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Options accepted by [`Signal::with_options`].
pub struct SignalOptions<T> {
    /// Custom change detection. Defaults to `old != new`.
    pub compare: Option<CompareFn<T>>,
    /// Hook invoked before every read.
    pub before_read: Option<BeforeReadFn>,
}

impl<T> SignalOptions<T> {
    /// Use `compare(old, new)` instead of `!=` to detect changes.
    pub fn compare(mut self, compare: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.compare = Some(Arc::new(compare));
        self
    }

    /// Run `hook` before every read of the signal.
    pub fn before_read(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_read = Some(Arc::new(hook));
        self
    }
}

impl<T> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            compare: None,
            before_read: None,
        }
    }
}

/// Options accepted by [`Signal::set_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Publish even if the comparator reports no change.
    pub touch: bool,
}

impl SetOptions {
    /// Options for a forced write.
    pub fn touch() -> Self {
        Self { touch: true }
    }
}

enum Slot<T> {
    Ready(T),
    Lazy(LazyFn<T>),
}

struct SignalState<T> {
    slot: Slot<T>,
    muted: bool,
    destroyed: bool,
}

struct SignalInner<T> {
    id: SignalId,
    compare: Option<CompareFn<T>>,
    before_read: RwLock<Option<BeforeReadFn>>,
    state: Mutex<SignalState<T>>,
    hooks: DestroyHooks,
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` provides the
///   default change detection.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a new signal with a custom comparator or read hook.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        Self::from_slot(Slot::Ready(value), options)
    }

    /// Create a signal whose value is computed by `init` on first read.
    pub fn lazy(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::lazy_with_options(init, SignalOptions::default())
    }

    /// [`lazy`](Self::lazy) with options.
    pub fn lazy_with_options(
        init: impl Fn() -> T + Send + Sync + 'static,
        options: SignalOptions<T>,
    ) -> Self {
        Self::from_slot(Slot::Lazy(Arc::new(init)), options)
    }

    fn from_slot(slot: Slot<T>, options: SignalOptions<T>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SignalId::new(),
                compare: options.compare,
                before_read: RwLock::new(options.before_read),
                state: Mutex::new(SignalState {
                    slot,
                    muted: false,
                    destroyed: false,
                }),
                hooks: DestroyHooks::new(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while an effect is running, this also registers the
    /// signal as a dependency of that effect.
    pub fn get(&self) -> T {
        let (value, destroyed) = self.read();
        if !destroyed {
            ReactiveContext::track(self.inner.id);
        }
        value
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency. The read hook still runs.
    pub fn get_untracked(&self) -> T {
        self.read().0
    }

    fn read(&self) -> (T, bool) {
        let hook = self.inner.before_read.read().clone();
        if let Some(hook) = hook {
            if !self.is_destroyed() {
                hook();
            }
        }

        let init = {
            let state = self.inner.state.lock();
            match &state.slot {
                Slot::Ready(value) => return (value.clone(), state.destroyed),
                Slot::Lazy(init) => Arc::clone(init),
            }
        };

        // The initializer runs unlocked; it may read other signals.
        let value = init();
        let mut state = self.inner.state.lock();
        if let Slot::Lazy(current) = &state.slot {
            if Arc::ptr_eq(current, &init) {
                state.slot = Slot::Ready(value.clone());
            }
        }
        (value, state.destroyed)
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        self.set_with(value, SetOptions::default());
    }

    /// Set a new value; `options.touch` publishes even without a change.
    pub fn set_with(&self, value: T, options: SetOptions) {
        let change = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                trace!(signal = %self.inner.id, "write to destroyed signal ignored");
                return;
            }
            let changed = match &state.slot {
                Slot::Ready(old) => self.is_changed(old, &value),
                Slot::Lazy(_) => true,
            };
            if changed {
                state.slot = Slot::Ready(value);
            }
            if state.muted {
                return;
            }
            match (changed, options.touch) {
                (true, _) => Change::Value,
                (false, true) => Change::Touch,
                (false, false) => return,
            }
        };

        Runtime::emit(self.inner.id, change);
    }

    /// Replace the value with a deferred one, computed on the next read.
    ///
    /// A lazy write always counts as a change.
    pub fn set_lazy(&self, init: impl Fn() -> T + Send + Sync + 'static) {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.slot = Slot::Lazy(Arc::new(init));
            if state.muted {
                return;
            }
        }
        Runtime::emit(self.inner.id, Change::Value);
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked();
        self.set(f(&current));
    }

    /// Publish the current value without changing it.
    pub fn touch(&self) {
        {
            let state = self.inner.state.lock();
            if state.destroyed || state.muted {
                return;
            }
        }
        Runtime::emit(self.inner.id, Change::Touch);
    }

    fn is_changed(&self, old: &T, new: &T) -> bool {
        match &self.inner.compare {
            Some(compare) => compare(old, new),
            None => old != new,
        }
    }

    /// Stop publishing writes. Writes still update the stored value.
    pub fn mute(&self) {
        self.set_muted(true);
    }

    /// Resume publishing writes.
    pub fn unmute(&self) {
        self.set_muted(false);
    }

    /// Set the muted flag.
    pub fn set_muted(&self, muted: bool) {
        self.inner.state.lock().muted = muted;
    }

    /// Check if the signal is muted.
    pub fn is_muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    /// Destroy the signal.
    ///
    /// Subscribers drop the dependency; effects and links left with nothing
    /// that could trigger them destroy themselves. The last value remains
    /// readable.
    pub fn destroy(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }

        debug!(signal = %self.inner.id, "destroying signal");
        *self.inner.before_read.write() = None;
        Runtime::signal_destroyed(self.inner.id);
        self.inner.hooks.fire();
    }

    /// Check if the signal has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Run `hook` once when the signal is destroyed (immediately if it
    /// already is).
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.hooks.push(Box::new(hook));
    }

    /// Replace the read hook.
    pub(crate) fn install_before_read(&self, hook: BeforeReadFn) {
        *self.inner.before_read.write() = Some(hook);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Signal<T> where T: Clone + PartialEq + Send + Sync + 'static {}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        let mut out = f.debug_struct("Signal");
        out.field("id", &self.inner.id);
        match &state.slot {
            Slot::Ready(value) => out.field("value", value),
            Slot::Lazy(_) => out.field("value", &"<lazy>"),
        };
        out.field("muted", &state.muted)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Erased handles
// ----------------------------------------------------------------------------

/// Type-erased view of anything backed by a signal.
///
/// Groups, the owner side-table and the free functions below work on
/// signals of any value type through this trait.
pub trait SignalLike: Send + Sync + 'static {
    /// Id of the backing signal.
    fn signal_id(&self) -> SignalId;

    /// Publish the current value without changing it.
    fn touch(&self);

    /// Destroy the backing signal.
    fn destroy(&self);

    /// Check if the backing signal has been destroyed.
    fn is_destroyed(&self) -> bool;

    /// Run `hook` once when the backing signal is destroyed.
    fn on_destroy_boxed(&self, hook: DestroyHook);

    /// Clone into a shared erased handle.
    fn erase(&self) -> Arc<dyn SignalLike>;

    /// The concrete handle, for downcasting back to `Signal<T>`.
    fn as_any(&self) -> &dyn Any;
}

impl<T> SignalLike for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn signal_id(&self) -> SignalId {
        self.id()
    }

    fn touch(&self) {
        Signal::touch(self);
    }

    fn destroy(&self) {
        Signal::destroy(self);
    }

    fn is_destroyed(&self) -> bool {
        Signal::is_destroyed(self)
    }

    fn on_destroy_boxed(&self, hook: DestroyHook) {
        self.inner.hooks.push(hook);
    }

    fn erase(&self) -> Arc<dyn SignalLike> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Read access shared by signals and memos.
pub trait SignalRead<T> {
    /// Read with dependency tracking.
    fn read_value(&self) -> T;

    /// Read without dependency tracking.
    fn read_untracked(&self) -> T;
}

impl<T> SignalRead<T> for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn read_value(&self) -> T {
        self.get()
    }

    fn read_untracked(&self) -> T {
        self.get_untracked()
    }
}

/// Create a new signal.
pub fn create_signal<T>(value: T) -> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(value)
}

/// Force-propagate a signal's current value.
pub fn touch(signal: &dyn SignalLike) {
    signal.touch();
}

/// Destroy every signal in `signals`.
pub fn destroy_signal(signals: &[&dyn SignalLike]) {
    for signal in signals {
        signal.destroy();
    }
}

/// Read a signal or memo, tracking the dependency.
pub fn value<T>(signal: &impl SignalRead<T>) -> T {
    signal.read_value()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
