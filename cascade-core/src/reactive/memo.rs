//! Memo Implementation
//!
//! A Memo is a cached derived value: a signal whose value is written by a
//! dedicated effect running the memo's computation.
//!
//! # How Memos Work
//!
//! 1. A memo owns a backing signal and a backing effect. The effect runs the
//!    computation (tracking what it reads) and writes the result into the
//!    signal, which publishes only if the result changed.
//!
//! 2. Memos run at [`DERIVED_PRIORITY`], so within one flush they settle
//!    before default-priority effects read them.
//!
//! 3. Every read first brings a stale memo up to date, so a memo read inside
//!    an open batch never returns a value older than its inputs.
//!
//! # Lazy Memos
//!
//! A lazy memo does not compute on creation and does not recompute when its
//! inputs change while nobody subscribes to it. It recomputes once, on the
//! next read, however many changes happened in between. A stale lazy memo
//! that does have subscribers is scheduled like an ordinary memo.
//!
//! # Teardown
//!
//! Destroying the backing signal destroys the backing effect and vice
//! versa; the memo as a whole also self-destroys once every signal it reads
//! has been destroyed.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use super::effect::{sync_callback, Effect, EffectOptions};
use super::group::SignalGroup;
use super::hibernate::be_quiet;
use super::hooks::DestroyHook;
use super::runtime::Runtime;
use super::signal::{Signal, SignalLike, SignalRead};
use super::SignalId;
use crate::error::Result;

/// Default flush priority of memos.
///
/// Higher than the default effect priority (0), so derived values settle
/// before their consumers run.
pub const DERIVED_PRIORITY: i32 = 10_000;

/// Options accepted by [`Memo::with_options`].
#[derive(Clone)]
pub struct MemoOptions {
    /// Compute on first read instead of eagerly.
    pub lazy: bool,
    /// Name under which the memo is registered in `attach`.
    pub name: Option<String>,
    /// Group that takes ownership of the memo.
    pub attach: Option<SignalGroup>,
    /// Flush priority of the backing effect.
    pub priority: i32,
}

impl MemoOptions {
    /// Defer computation to the first read.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Register the memo under `name` in the attached group.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the memo to `group`.
    pub fn attach(mut self, group: &SignalGroup) -> Self {
        self.attach = Some(group.clone());
        self
    }

    /// Override the flush priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for MemoOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            name: None,
            attach: None,
            priority: DERIVED_PRIORITY,
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` decides whether a
///   recomputation is a change worth publishing.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    signal: Signal<T>,
    effect: Effect,
    name: Option<Arc<str>>,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a memo that computes immediately.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Arc::new(compute), &MemoOptions::default())
    }

    /// Create a memo that computes on first read.
    pub fn lazy<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Arc::new(compute), &MemoOptions::default().lazy(true))
    }

    /// Create a memo with explicit options.
    ///
    /// Fails if `options.attach` names a destroyed group; the memo is
    /// destroyed in that case.
    pub fn with_options<F>(compute: F, options: MemoOptions) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let memo = Self::build(Arc::new(compute), &options);

        if let Some(group) = &options.attach {
            let attached = match &options.name {
                Some(name) => group.attach_signal_by_name(name, &memo),
                None => group.attach_signal(&memo),
            }
            .and_then(|()| group.attach_effect(&memo.effect));

            if let Err(err) = attached {
                memo.destroy();
                return Err(err);
            }
        }

        Ok(memo)
    }

    fn build(compute: Arc<dyn Fn() -> T + Send + Sync>, options: &MemoOptions) -> Self {
        // Only reached if the effect is gone before the first computation.
        let fallback = Arc::clone(&compute);
        let signal = Signal::lazy(move || be_quiet(|| fallback()));

        let writer = signal.clone();
        let effect = Effect::spawn(
            sync_callback(move || writer.set(compute())),
            &EffectOptions::default()
                .autorun(!options.lazy)
                .priority(options.priority),
        );

        let weak = effect.downgrade();
        signal.install_before_read(Arc::new(move || {
            if let Some(effect) = weak.upgrade() {
                effect.run_if_stale();
            }
        }));

        if options.lazy {
            let signal_id = signal.id();
            effect.set_on_stale(Arc::new(move || Runtime::subscriber_count(signal_id) > 0));
        }

        let weak = effect.downgrade();
        signal.on_destroy(move || {
            if let Some(effect) = weak.upgrade() {
                effect.destroy();
            }
        });
        let owned = signal.clone();
        effect.on_destroy(move || owned.destroy());

        Self {
            signal,
            effect,
            name: options.name.as_deref().map(Arc::from),
        }
    }

    /// Id of the backing signal.
    pub fn id(&self) -> SignalId {
        self.signal.id()
    }

    /// Get the current value, recomputing first if stale.
    ///
    /// Tracked like any signal read.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without tracking, recomputing first if stale.
    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Check if an input changed since the last computation.
    pub fn is_stale(&self) -> bool {
        self.effect.is_stale()
    }

    /// The backing signal.
    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }

    /// The backing effect.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    /// The name the memo was created with, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Destroy the memo: its backing signal and backing effect.
    pub fn destroy(&self) {
        self.signal.destroy();
    }

    /// Check if the memo has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.signal.is_destroyed()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            effect: self.effect.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("name", &self.name)
            .field("signal", &self.signal)
            .field("effect", &self.effect)
            .finish()
    }
}

impl<T> SignalLike for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn signal_id(&self) -> SignalId {
        self.signal.id()
    }

    fn touch(&self) {
        self.signal.touch();
    }

    fn destroy(&self) {
        Memo::destroy(self);
    }

    fn is_destroyed(&self) -> bool {
        Memo::is_destroyed(self)
    }

    fn on_destroy_boxed(&self, hook: DestroyHook) {
        self.signal.on_destroy(hook);
    }

    fn erase(&self) -> Arc<dyn SignalLike> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> SignalRead<T> for Memo<T>
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

/// Create a memo that computes immediately.
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
