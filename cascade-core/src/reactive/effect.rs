//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a signal
//! it read during its previous run changes.
//!
//! # How Effects Work
//!
//! 1. When created, a dynamic effect runs its callback immediately with
//!    itself on top of the effect stack; every signal read becomes a
//!    dependency.
//!
//! 2. After each run, the signals read in that run are diffed against the
//!    previous subscriptions: lost signals are unsubscribed, new ones
//!    subscribed.
//!
//! 3. When a dependency changes, the effect is marked stale and queued on
//!    the open batch, which runs it once at flush.
//!
//! A static effect is given its dependencies up front, never tracks reads,
//! and by default does not run on creation.
//!
//! # Nesting
//!
//! An effect created while another effect runs becomes its child. Every run
//! of the parent destroys the children of the previous run before the
//! callback executes, so each run rebuilds its children in creation order.
//!
//! # Cleanup
//!
//! The callback may return a [`Cleanup`]. It is invoked right before the
//! next run and on destroy. Async callbacks install their cleanup once the
//! returned future resolves; a cleanup that arrives after the effect has
//! re-run or been destroyed is invoked immediately instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use indexmap::IndexSet;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::{QuietGuard, ReactiveContext};
use super::group::SignalGroup;
use super::hooks::DestroyHooks;
use super::runtime::{Change, Observer, Runtime};
use super::signal::SignalLike;
use super::{ObserverId, SignalId};
use crate::error::Result;

/// A callback run before an effect's next run and when it is destroyed.
pub struct Cleanup(Box<dyn FnOnce() + Send>);

impl Cleanup {
    /// Wrap a cleanup callback.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    fn invoke(self) {
        (self.0)();
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect callback may return.
pub trait IntoCleanup {
    /// Convert into an optional cleanup.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

pub(crate) type CleanupFuture = Pin<Box<dyn Future<Output = Option<Cleanup>> + Send>>;

pub(crate) enum Outcome {
    Done(Option<Cleanup>),
    Pending(CleanupFuture),
}

pub(crate) type Callback = Box<dyn Fn() -> Outcome + Send + Sync>;

/// Decides whether a stale effect that does not rerun on its own should be
/// scheduled anyway.
pub(crate) type StaleHook = Arc<dyn Fn() -> bool + Send + Sync>;

/// Options accepted by [`Effect::with_options`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Whether the effect runs on its own. `None` picks the mode default:
    /// dynamic effects run on creation and on change; static effects run on
    /// change only unless this is `Some(true)`.
    pub autorun: Option<bool>,
    /// Explicit dependency list. Supplying one makes the effect static.
    pub dependencies: Option<Vec<SignalId>>,
    /// Group that takes ownership of the effect.
    pub attach: Option<SignalGroup>,
    /// Flush priority; higher runs first. Defaults to 0.
    pub priority: i32,
    /// Declared dependencies that were already destroyed when declared.
    destroyed_dependencies: Vec<SignalId>,
}

impl EffectOptions {
    /// Set the autorun flag.
    pub fn autorun(mut self, autorun: bool) -> Self {
        self.autorun = Some(autorun);
        self
    }

    /// Add an explicit dependency, making the effect static.
    ///
    /// A signal that is already destroyed is remembered but never
    /// subscribed to.
    pub fn depends_on(mut self, signal: &dyn SignalLike) -> Self {
        if signal.is_destroyed() {
            self.destroyed_dependencies.push(signal.signal_id());
        }
        self.dependencies
            .get_or_insert_with(Vec::new)
            .push(signal.signal_id());
        self
    }

    /// Replace the explicit dependency list, making the effect static.
    pub fn dependencies(mut self, signals: impl IntoIterator<Item = SignalId>) -> Self {
        self.dependencies = Some(signals.into_iter().collect());
        self.destroyed_dependencies.clear();
        self
    }

    /// Attach the effect to `group`.
    pub fn attach(mut self, group: &SignalGroup) -> Self {
        self.attach = Some(group.clone());
        self
    }

    /// Set the flush priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Mutable part of an effect.
struct EffectState {
    parent: Option<Weak<EffectInner>>,
    children: SmallVec<[Effect; 4]>,
    /// Signals currently subscribed to.
    dependencies: IndexSet<SignalId>,
    should_run: bool,
    destroyed: bool,
    cleanup: Option<Cleanup>,
    /// Incremented at the start of every run.
    generation: u64,
    run_count: usize,
    on_stale: Option<StaleHook>,
}

struct EffectInner {
    id: ObserverId,
    callback: Callback,
    /// Static effects run with tracking off.
    tracking: bool,
    /// Whether a change notification queues the effect.
    rerun: bool,
    priority: i32,
    this: Weak<EffectInner>,
    state: Mutex<EffectState>,
    hooks: DestroyHooks,
}

/// A side-effecting computation that runs when dependencies change.
///
/// An effect lives until it is destroyed: explicitly, by its parent effect,
/// by its group, or when every signal it depends on has been destroyed.
/// Dropping a handle does not destroy it.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new dynamic effect.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        Self::spawn(sync_callback(f), &EffectOptions::default())
    }

    /// Create an effect with explicit options.
    ///
    /// Fails only if `options.attach` names a destroyed group.
    pub fn with_options<F, R>(f: F, options: EffectOptions) -> Result<Self>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoCleanup,
    {
        Self::build(sync_callback(f), options)
    }

    /// Create a dynamic effect whose callback is asynchronous.
    ///
    /// The returned future is polled once inside the effect's tracking frame,
    /// so reads before its first suspension point are dependencies. If it is
    /// still pending it is driven to completion on the current tokio runtime
    /// and its cleanup installed afterwards.
    pub fn new_async<F, Fut, R>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoCleanup + 'static,
    {
        Self::spawn(async_callback(f), &EffectOptions::default())
    }

    /// [`new_async`](Self::new_async) with explicit options.
    pub fn new_async_with_options<F, Fut, R>(f: F, options: EffectOptions) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoCleanup + 'static,
    {
        Self::build(async_callback(f), options)
    }

    fn build(callback: Callback, options: EffectOptions) -> Result<Self> {
        let group = options.attach.clone();
        let effect = Self::create(callback, &options);

        if let Some(group) = group {
            if let Err(err) = group.attach_effect(&effect) {
                effect.destroy();
                return Err(err);
            }
        }

        effect.start(&options);
        Ok(effect)
    }

    /// Create and start an effect that is not attached to any group.
    pub(crate) fn spawn(callback: Callback, options: &EffectOptions) -> Self {
        let effect = Self::create(callback, options);
        effect.start(options);
        effect
    }

    fn create(callback: Callback, options: &EffectOptions) -> Self {
        let tracking = options.dependencies.is_none();
        let rerun = if tracking {
            options.autorun.unwrap_or(true)
        } else {
            true
        };
        let dependencies: IndexSet<SignalId> = options
            .dependencies
            .iter()
            .flatten()
            .filter(|signal| !options.destroyed_dependencies.contains(signal))
            .copied()
            .collect();

        let inner = Arc::new_cyclic(|this| EffectInner {
            id: ObserverId::new(),
            callback,
            tracking,
            rerun,
            priority: options.priority,
            this: this.clone(),
            state: Mutex::new(EffectState {
                parent: None,
                children: SmallVec::new(),
                dependencies: dependencies.clone(),
                // Never ran, so a first run is due.
                should_run: true,
                destroyed: false,
                cleanup: None,
                generation: 0,
                run_count: 0,
                on_stale: None,
            }),
            hooks: DestroyHooks::new(),
        });

        for signal in dependencies {
            Runtime::subscribe(signal, inner.clone());
        }

        Self { inner }
    }

    /// Adopt into the running effect (if any) and do the initial run.
    fn start(&self, options: &EffectOptions) {
        // Every declared dependency was dead on arrival; nothing can trigger it.
        if !options.destroyed_dependencies.is_empty() && self.dependency_count() == 0 {
            debug!(effect = %self.id(), "every declared dependency already destroyed");
            self.destroy();
            return;
        }

        if let Some(parent) = ReactiveContext::current_effect() {
            parent.adopt(self);
        }

        let run_on_create = if self.inner.tracking {
            options.autorun.unwrap_or(true)
        } else {
            options.autorun.unwrap_or(false)
        };
        if run_on_create {
            self.run();
        }
    }

    fn adopt(&self, child: &Effect) {
        let parent_destroyed = {
            let mut state = self.inner.state.lock();
            if !state.destroyed {
                state.children.push(child.clone());
            }
            state.destroyed
        };

        if parent_destroyed {
            child.destroy();
            return;
        }
        child.inner.state.lock().parent = Some(Arc::downgrade(&self.inner));
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Get the flush priority.
    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    /// Run the effect now, whether or not it is stale.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Run the effect if a dependency changed since its last run.
    pub fn run_if_stale(&self) {
        self.inner.flush();
    }

    /// Destroy the effect.
    ///
    /// Children are destroyed first (innermost first), then the pending
    /// cleanup runs, then every subscription is released.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Check if the effect has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Check if a run is due.
    pub fn is_stale(&self) -> bool {
        self.inner.state.lock().should_run
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.state.lock().run_count
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().dependencies.len()
    }

    /// Signals the effect is subscribed to, in subscription order.
    pub fn dependencies(&self) -> Vec<SignalId> {
        self.inner.state.lock().dependencies.iter().copied().collect()
    }

    /// Get the number of children created by the latest run.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// The effect this one was created inside, if it is still alive.
    pub fn parent(&self) -> Option<Effect> {
        let parent = self.inner.state.lock().parent.clone();
        parent.and_then(|weak| weak.upgrade()).map(|inner| Effect { inner })
    }

    /// Run `hook` once when the effect is destroyed.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.hooks.push(Box::new(hook));
    }

    pub(crate) fn set_on_stale(&self, hook: StaleHook) {
        self.inner.state.lock().on_stale = Some(hook);
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Arc::downgrade(&self.inner))
    }
}

/// Non-owning effect handle.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub(crate) fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(|inner| Effect { inner })
    }
}

pub(crate) fn sync_callback<F, R>(f: F) -> Callback
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoCleanup,
{
    Box::new(move || Outcome::Done(f().into_cleanup()))
}

fn async_callback<F, Fut, R>(f: F) -> Callback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoCleanup + 'static,
{
    Box::new(move || {
        let future = f();
        Outcome::Pending(Box::pin(async move { future.await.into_cleanup() }))
    })
}

/// Poll a future once with a waker that does nothing.
fn poll_once(mut future: CleanupFuture) -> std::result::Result<Option<Cleanup>, CleanupFuture> {
    let mut cx = Context::from_waker(futures_util::task::noop_waker_ref());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(cleanup) => Ok(cleanup),
        Poll::Pending => Err(future),
    }
}

impl EffectInner {
    fn run(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        let (children, cleanup, generation) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.should_run = false;
            state.generation += 1;
            state.run_count += 1;
            (
                std::mem::take(&mut state.children),
                state.cleanup.take(),
                state.generation,
            )
        };

        // Teardown reads are never tracked, whichever effect is on the stack.
        {
            let _quiet = QuietGuard::new();
            for child in children {
                child.destroy();
            }
            if let Some(cleanup) = cleanup {
                cleanup.invoke();
            }
        }

        trace!(effect = %self.id, generation, "running effect");

        let ctx = ReactiveContext::enter(Effect { inner: this.clone() }, self.tracking);
        let settled = match (self.callback)() {
            Outcome::Done(cleanup) => Ok(cleanup),
            Outcome::Pending(future) => poll_once(future),
        };
        let touched = ctx.finish();

        if self.tracking {
            self.resubscribe(&this, touched);
        }

        match settled {
            Ok(cleanup) => self.install_cleanup(generation, cleanup),
            Err(future) => self.await_cleanup(generation, future),
        }
    }

    /// The lost-signal pass: diff this run's reads against the previous
    /// subscriptions.
    fn resubscribe(&self, this: &Arc<EffectInner>, touched: IndexSet<SignalId>) {
        let (lost, gained) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            let lost: Vec<_> = state.dependencies.difference(&touched).copied().collect();
            let gained: Vec<_> = touched.difference(&state.dependencies).copied().collect();
            state.dependencies = touched;
            (lost, gained)
        };

        for signal in lost {
            Runtime::unsubscribe(signal, self.id);
        }
        for signal in gained {
            Runtime::subscribe(signal, this.clone());
        }
    }

    fn install_cleanup(&self, generation: u64, cleanup: Option<Cleanup>) {
        let Some(cleanup) = cleanup else {
            return;
        };
        let mut state = self.state.lock();
        if state.destroyed || state.generation != generation {
            drop(state);
            cleanup.invoke();
        } else {
            state.cleanup = Some(cleanup);
        }
    }

    fn await_cleanup(&self, generation: u64, future: CleanupFuture) {
        let this = self.this.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let cleanup = future.await;
                    match this.upgrade() {
                        Some(inner) => inner.install_cleanup(generation, cleanup),
                        None => {
                            if let Some(cleanup) = cleanup {
                                cleanup.invoke();
                            }
                        }
                    }
                });
            }
            Err(_) => {
                warn!(
                    effect = %self.id,
                    "async effect suspended outside a tokio runtime; its cleanup is dropped"
                );
            }
        }
    }

    fn destroy(&self) {
        let (children, cleanup, dependencies, parent) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.should_run = false;
            state.on_stale = None;
            (
                std::mem::take(&mut state.children),
                state.cleanup.take(),
                std::mem::take(&mut state.dependencies),
                state.parent.take(),
            )
        };

        debug!(effect = %self.id, children = children.len(), "destroying effect");

        {
            let _quiet = QuietGuard::new();
            for child in children {
                child.destroy();
            }
            if let Some(cleanup) = cleanup {
                cleanup.invoke();
            }
        }
        for signal in dependencies {
            Runtime::unsubscribe(signal, self.id);
        }
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            parent.state.lock().children.retain(|child| child.id() != self.id);
        }

        self.hooks.fire();
    }
}

impl Observer for EffectInner {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn notify(&self, signal: SignalId, change: Change) {
        let on_stale = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.should_run = true;
            state.on_stale.clone()
        };

        trace!(effect = %self.id, signal = %signal, ?change, "effect triggered");

        let schedule = self.rerun || on_stale.is_some_and(|hook| hook());
        if !schedule {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            if !ReactiveContext::enqueue(this) {
                self.flush();
            }
        }
    }

    fn flush(&self) {
        let due = {
            let state = self.state.lock();
            state.should_run && !state.destroyed
        };
        if due {
            self.run();
        }
    }

    fn signal_destroyed(&self, signal: SignalId) {
        let orphaned = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.dependencies.shift_remove(&signal);
            state.dependencies.is_empty()
        };

        if orphaned {
            debug!(effect = %self.id, "every dependency destroyed");
            self.destroy();
        }
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Effect {}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("priority", &self.inner.priority)
            .field("run_count", &state.run_count)
            .field("dependency_count", &state.dependencies.len())
            .field("child_count", &state.children.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

/// Create a new dynamic effect.
pub fn create_effect<F, R>(f: F) -> Effect
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoCleanup,
{
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
