//! Signal Links
//!
//! A link is a standing one-directional channel that copies a source
//! signal's value into a target: another signal, a property setter, or a
//! plain callback.
//!
//! # How Links Work
//!
//! 1. On construction the link writes the source's current value to the
//!    target (a forced write, so a target signal publishes even if equal).
//!
//! 2. The link subscribes to the source on the signal channel like an
//!    effect does, and is queued and flushed with the same batch rules.
//!    Each flush writes the source's value through to the target unless
//!    the link is muted.
//!
//! 3. A target signal is subscribed too, but only so that its destruction
//!    destroys the link; its own emissions are ignored.
//!
//! At most one live link exists per (source, target) pair. Asking for the
//! same pair again returns the existing link and writes nothing.

use std::any::Any;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::group::SignalGroup;
use super::hibernate::be_quiet;
use super::hooks::{DestroyHook, DestroyHooks};
use super::runtime::{Change, Observer, Runtime};
use super::signal::{SetOptions, Signal};
use super::{ObserverId, OwnerId, SignalId};
use crate::error::{Error, Result};

/// Buffer size of the broadcast channel behind [`Link::events`].
pub const LINK_EVENT_CAPACITY: usize = 16;

/// Setter invoked by callback and property targets.
pub type SetterFn<T> = Arc<dyn Fn(T) + Send + Sync>;

type Registry = DashMap<(SignalId, TargetKey), Arc<dyn LinkLike>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(DashMap::new)
}

/// What a link writes into, resolved once at construction.
pub enum TargetKind<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Another signal.
    Signal(Signal<T>),
    /// A plain callback receiving every propagated value.
    Callback(SetterFn<T>),
    /// A named property on an owner, written through its setter.
    Property(SetterFn<T>),
}

impl<T> Clone for TargetKind<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        match self {
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Callback(f) => Self::Callback(Arc::clone(f)),
            Self::Property(f) => Self::Property(Arc::clone(f)),
        }
    }
}

/// Identity of a target, used for singleton-by-pair lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TargetKey {
    Signal(SignalId),
    Callback(usize),
    Property(OwnerId, String),
    Method(OwnerId, String),
}

/// The target of a [`Link`].
///
/// Two targets are the same target if they wrap the same signal, the same
/// callback allocation (clones of one `LinkTarget`), or the same
/// owner/property name.
pub struct LinkTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    kind: TargetKind<T>,
    key: TargetKey,
}

impl<T> LinkTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Target another signal.
    pub fn signal(signal: &Signal<T>) -> Self {
        Self {
            key: TargetKey::Signal(signal.id()),
            kind: TargetKind::Signal(signal.clone()),
        }
    }

    /// Target a callback.
    pub fn callback(f: impl Fn(T) + Send + Sync + 'static) -> Self {
        let f: SetterFn<T> = Arc::new(f);
        Self {
            key: TargetKey::Callback(callback_key(&f)),
            kind: TargetKind::Callback(f),
        }
    }

    /// Target the property `name` of `owner`, written with `setter`.
    pub fn property(
        owner: OwnerId,
        name: impl Into<String>,
        setter: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: TargetKey::Property(owner, name.into()),
            kind: TargetKind::Property(Arc::new(setter)),
        }
    }

    /// Target the method `name` of `owner`.
    pub(crate) fn method(
        owner: OwnerId,
        name: impl Into<String>,
        method: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: TargetKey::Method(owner, name.into()),
            kind: TargetKind::Callback(Arc::new(method)),
        }
    }

    /// The resolved target kind.
    pub fn kind(&self) -> &TargetKind<T> {
        &self.kind
    }

    fn signal_id(&self) -> Option<SignalId> {
        match &self.kind {
            TargetKind::Signal(signal) => Some(signal.id()),
            _ => None,
        }
    }
}

fn callback_key<T>(f: &SetterFn<T>) -> usize {
    Arc::as_ptr(f) as *const () as usize
}

impl<T> Clone for LinkTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            key: self.key.clone(),
        }
    }
}

impl<T> From<&Signal<T>> for LinkTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        Self::signal(signal)
    }
}

impl<T> From<Signal<T>> for LinkTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Self::signal(&signal)
    }
}

/// Options accepted by [`link_with`].
#[derive(Clone, Default)]
pub struct LinkOptions {
    /// Group that takes ownership of the link.
    pub attach: Option<SignalGroup>,
}

impl LinkOptions {
    /// Attach the link to `group`.
    pub fn attach(mut self, group: &SignalGroup) -> Self {
        self.attach = Some(group.clone());
        self
    }
}

/// Observable state transitions of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    /// Propagation was switched off.
    Muted,
    /// Propagation was switched back on.
    Unmuted,
    /// The link was destroyed; no further events follow.
    Destroyed,
}

struct LinkState<T> {
    muted: bool,
    destroyed: bool,
    last_value: Option<T>,
    pending: Option<Change>,
    waiters: Vec<oneshot::Sender<T>>,
}

struct LinkInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    id: ObserverId,
    source: Signal<T>,
    target: LinkTarget<T>,
    this: Weak<LinkInner<T>>,
    state: Mutex<LinkState<T>>,
    events: broadcast::Sender<LinkEvent>,
    hooks: DestroyHooks,
}

/// A synchronization channel from a source signal to a target.
///
/// Like effects, a link lives until it is destroyed: explicitly, by its
/// group, or when either endpoint signal is destroyed. Destroying the link
/// leaves both endpoints alone.
pub struct Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<LinkInner<T>>,
}

impl<T> Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Return the live link for `(source, target)`, creating it if needed.
    /// The flag is true if this call created it.
    fn find_or_create(source: &Signal<T>, target: LinkTarget<T>) -> (Self, bool) {
        let key = (source.id(), target.key.clone());
        let existing = registry().get(&key).map(|entry| Arc::clone(entry.value()));
        if let Some(existing) = existing {
            if let Some(link) = existing.as_any().downcast_ref::<Link<T>>() {
                if !link.is_destroyed() {
                    return (link.clone(), false);
                }
            }
        }

        let (events, _) = broadcast::channel(LINK_EVENT_CAPACITY);
        let inner = Arc::new_cyclic(|this| LinkInner {
            id: ObserverId::new(),
            source: source.clone(),
            target,
            this: this.clone(),
            state: Mutex::new(LinkState {
                muted: false,
                destroyed: false,
                last_value: None,
                pending: None,
                waiters: Vec::new(),
            }),
            events,
            hooks: DestroyHooks::new(),
        });
        let link = Self { inner };

        debug!(
            link = %link.inner.id,
            source = %source.id(),
            target = ?link.inner.target.key,
            "creating link"
        );

        registry().insert(key, link.erase());
        Runtime::subscribe(source.id(), link.inner.clone());
        if let Some(target) = link.inner.target.signal_id() {
            Runtime::subscribe(target, link.inner.clone());
        }

        let endpoint_gone = source.is_destroyed()
            || matches!(&link.inner.target.kind, TargetKind::Signal(target) if target.is_destroyed());
        if endpoint_gone {
            link.destroy();
        } else {
            link.inner.write_through(true);
        }
        (link, true)
    }

    /// Get the link's unique ID.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Id of the source signal.
    pub fn source_id(&self) -> SignalId {
        self.inner.source.id()
    }

    /// The target this link writes into.
    pub fn target(&self) -> &LinkTarget<T> {
        &self.inner.target
    }

    /// The value most recently written through, if any.
    pub fn last_value(&self) -> Option<T> {
        self.inner.state.lock().last_value.clone()
    }

    /// Stop writing through. Emits [`LinkEvent::Muted`] on a transition.
    pub fn mute(&self) {
        self.set_muted(true);
    }

    /// Resume writing through. Emits [`LinkEvent::Unmuted`] on a
    /// transition.
    pub fn unmute(&self) {
        self.set_muted(false);
    }

    /// Flip the muted state.
    pub fn toggle(&self) {
        let muted = self.is_muted();
        self.set_muted(!muted);
    }

    fn set_muted(&self, muted: bool) {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed || state.muted == muted {
                return;
            }
            state.muted = muted;
            if muted {
                state.pending = None;
            }
        }
        let event = if muted {
            LinkEvent::Muted
        } else {
            LinkEvent::Unmuted
        };
        trace!(link = %self.inner.id, ?event, "link state changed");
        let _ = self.inner.events.send(event);
    }

    /// Check if the link is muted.
    pub fn is_muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    /// Write the source's current value through now, forcing a target
    /// signal to publish even if the value is unchanged.
    pub fn touch(&self) {
        if self.is_destroyed() {
            return;
        }
        self.inner.write_through(true);
    }

    /// Wait for the next value written through after this call.
    ///
    /// The value already written is not replayed. Resolves to
    /// [`Error::LinkClosed`] if the link is destroyed first.
    pub fn next_value(&self) -> NextValue<T> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if !state.destroyed {
                state.waiters.push(tx);
            }
        }
        NextValue { rx }
    }

    /// Subscribe to mute, unmute and destroy events.
    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.inner.events.subscribe()
    }

    /// Destroy the link. Endpoint signals are left alone.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Check if the link has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Run `hook` once when the link is destroyed.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.hooks.push(Box::new(hook));
    }
}

impl<T> LinkInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn is_self_loop(&self) -> bool {
        self.target.signal_id() == Some(self.source.id())
    }

    fn write_through(&self, force: bool) {
        let value = self.source.get_untracked();
        // A forced write into the source itself would never settle.
        let force = force && !self.is_self_loop();

        trace!(link = %self.id, force, "link write-through");

        be_quiet(|| match &self.target.kind {
            TargetKind::Signal(target) if force => {
                target.set_with(value.clone(), SetOptions::touch())
            }
            TargetKind::Signal(target) => target.set(value.clone()),
            TargetKind::Callback(f) | TargetKind::Property(f) => f(value.clone()),
        });

        let waiters = {
            let mut state = self.state.lock();
            state.last_value = Some(value.clone());
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(value.clone());
        }
    }

    fn destroy(&self) {
        let waiters = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.pending = None;
            std::mem::take(&mut state.waiters)
        };

        debug!(link = %self.id, source = %self.source.id(), "destroying link");

        Runtime::unsubscribe(self.source.id(), self.id);
        if let Some(target) = self.target.signal_id() {
            Runtime::unsubscribe(target, self.id);
        }
        registry().remove_if(&(self.source.id(), self.target.key.clone()), |_, link| {
            link.link_id() == self.id
        });

        // Dropping the senders rejects every pending `next_value`.
        drop(waiters);
        let _ = self.events.send(LinkEvent::Destroyed);
        self.hooks.fire();
    }
}

impl<T> Observer for LinkInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn priority(&self) -> i32 {
        0
    }

    fn notify(&self, signal: SignalId, change: Change) {
        if signal != self.source.id() {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.destroyed || state.muted {
                return;
            }
            state.pending = match (state.pending, change) {
                (Some(Change::Touch), _) | (_, Change::Touch) => Some(Change::Touch),
                _ => Some(Change::Value),
            };
        }
        if let Some(this) = self.this.upgrade() {
            if !ReactiveContext::enqueue(this) {
                self.flush();
            }
        }
    }

    fn flush(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.destroyed || state.muted {
                return;
            }
            state.pending.take()
        };
        if let Some(change) = pending {
            self.write_through(change == Change::Touch);
        }
    }

    fn signal_destroyed(&self, signal: SignalId) {
        debug!(link = %self.id, signal = %signal, "link endpoint destroyed");
        self.destroy();
    }
}

impl<T> Clone for Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Link<T> where T: Clone + PartialEq + Send + Sync + 'static {}

impl<T> Hash for Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T> std::fmt::Debug for Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Link")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source.id())
            .field("target", &self.inner.target.key)
            .field("muted", &state.muted)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

/// Future returned by [`Link::next_value`].
pub struct NextValue<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for NextValue<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| Error::LinkClosed))
    }
}

// ----------------------------------------------------------------------------
// Erased handles
// ----------------------------------------------------------------------------

/// Type-erased view of a link, for groups and the link registry.
pub trait LinkLike: Send + Sync + 'static {
    /// Get the link's unique ID.
    fn link_id(&self) -> ObserverId;

    /// Check if the link has been destroyed.
    fn is_destroyed(&self) -> bool;

    /// Destroy the link.
    fn destroy(&self);

    /// Run `hook` once when the link is destroyed.
    fn on_destroy_boxed(&self, hook: DestroyHook);

    /// Clone into a shared erased handle.
    fn erase(&self) -> Arc<dyn LinkLike>;

    /// The concrete handle, for downcasting back to `Link<T>`.
    fn as_any(&self) -> &dyn Any;
}

impl<T> LinkLike for Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn link_id(&self) -> ObserverId {
        self.id()
    }

    fn is_destroyed(&self) -> bool {
        Link::is_destroyed(self)
    }

    fn destroy(&self) {
        Link::destroy(self);
    }

    fn on_destroy_boxed(&self, hook: DestroyHook) {
        self.inner.hooks.push(hook);
    }

    fn erase(&self) -> Arc<dyn LinkLike> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ----------------------------------------------------------------------------
// Free functions
// ----------------------------------------------------------------------------

/// Link `source` to `target`, or return the live link between them.
pub fn link<T>(source: &Signal<T>, target: impl Into<LinkTarget<T>>) -> Link<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Link::find_or_create(source, target.into()).0
}

/// [`link`] with options.
///
/// Fails if `options.attach` names a destroyed group. A link created by
/// this call is destroyed in that case.
pub fn link_with<T>(
    source: &Signal<T>,
    target: impl Into<LinkTarget<T>>,
    options: LinkOptions,
) -> Result<Link<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let (link, created) = Link::find_or_create(source, target.into());
    if let Some(group) = &options.attach {
        if let Err(err) = group.attach_link(&link) {
            if created {
                link.destroy();
            }
            return Err(err);
        }
    }
    Ok(link)
}

/// Destroy the link from `source` to `target`, or every link leaving
/// `source` if `target` is `None`.
pub fn unlink<T>(source: &Signal<T>, target: Option<&LinkTarget<T>>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let doomed: Vec<Arc<dyn LinkLike>> = match target {
        Some(target) => registry()
            .get(&(source.id(), target.key.clone()))
            .map(|entry| Arc::clone(entry.value()))
            .into_iter()
            .collect(),
        None => registry()
            .iter()
            .filter(|entry| entry.key().0 == source.id())
            .map(|entry| Arc::clone(entry.value()))
            .collect(),
    };
    for link in doomed {
        link.destroy();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn link_copies_initial_value_and_follows_source() {
        let source = Signal::new(1);
        let target = Signal::new(0);

        let link = link(&source, &target);
        assert_eq!(target.get(), 1);
        assert_eq!(link.last_value(), Some(1));

        source.set(5);
        assert_eq!(target.get(), 5);
    }

    #[test]
    fn link_is_singleton_per_pair() {
        let source = Signal::new(1);
        let writes = Arc::new(AtomicI32::new(0));
        let writes_clone = writes.clone();
        let target = LinkTarget::callback(move |_: i32| {
            writes_clone.fetch_add(1, Ordering::SeqCst);
        });

        let first = link(&source, target.clone());
        let second = link(&source, target);

        assert_eq!(first, second);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn muted_link_skips_write_through() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);

        link.mute();
        source.set(3);
        assert_eq!(target.get(), 0);

        link.toggle();
        assert!(!link.is_muted());
        source.set(4);
        assert_eq!(target.get(), 4);
    }

    #[test]
    fn mute_events_fire_once_per_transition() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);
        let mut events = link.events();

        link.mute();
        link.mute();
        link.unmute();
        link.destroy();
        link.mute();

        assert_eq!(events.try_recv(), Ok(LinkEvent::Muted));
        assert_eq!(events.try_recv(), Ok(LinkEvent::Unmuted));
        assert_eq!(events.try_recv(), Ok(LinkEvent::Destroyed));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn touch_forces_target_emission() {
        let source = Signal::new(7);
        let target = Signal::new(0);
        let link = link(&source, &target);

        let runs = Arc::new(AtomicI32::new(0));
        let (target_clone, runs_clone) = (target.clone(), runs.clone());
        let _effect = crate::reactive::Effect::new(move || {
            target_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        link.touch();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_loop_touch_terminates() {
        let signal = Signal::new(1);
        let link = link(&signal, &signal);
        link.touch();
        signal.set(2);
        assert_eq!(signal.get(), 2);
    }

    #[test]
    fn link_writes_once_per_batch() {
        let source = Signal::new(0);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _link = link(
            &source,
            LinkTarget::callback(move |value: i32| seen_clone.lock().push(value)),
        );

        batch(|| {
            source.set(1);
            source.set(2);
        });
        assert_eq!(*seen.lock(), vec![0, 2]);
    }

    #[test]
    fn endpoint_destruction_destroys_link() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);

        target.destroy();
        assert!(link.is_destroyed());
        assert!(!source.is_destroyed());

        let again = super::link(&source, &Signal::new(0));
        source.destroy();
        assert!(again.is_destroyed());
    }

    #[test]
    fn destroying_link_leaves_endpoints() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);

        link.destroy();
        assert!(!source.is_destroyed());
        assert!(!target.is_destroyed());

        source.set(9);
        assert_eq!(target.get(), 0);

        // A fresh link can be made for the same pair
        let fresh = super::link(&source, &target);
        assert_ne!(fresh, link);
        assert_eq!(target.get(), 9);
    }

    #[test]
    fn unlink_by_target_and_by_source() {
        let source = Signal::new(0);
        let a = Signal::new(0);
        let b = Signal::new(0);
        let to_a = link(&source, &a);
        let to_b = link(&source, &b);

        unlink(&source, Some(&LinkTarget::signal(&a)));
        assert!(to_a.is_destroyed());
        assert!(!to_b.is_destroyed());

        unlink(&source, None);
        assert!(to_b.is_destroyed());
    }

    #[test]
    fn property_target_uses_owner_and_name() {
        let owner = OwnerId::new();
        let source = Signal::new(String::from("a"));
        let stored = Arc::new(parking_lot::Mutex::new(String::new()));

        let stored_clone = stored.clone();
        let first = link(
            &source,
            LinkTarget::property(owner, "title", move |v: String| *stored_clone.lock() = v),
        );
        let second = link(&source, LinkTarget::property(owner, "title", |_: String| {}));

        assert_eq!(first, second);
        source.set(String::from("b"));
        assert_eq!(*stored.lock(), "b");
    }

    #[tokio::test]
    async fn next_value_resolves_with_following_write() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);

        let next = link.next_value();
        source.set(1);
        source.set(2);
        assert_eq!(next.await, Ok(1));

        let next = link.next_value();
        source.set(3);
        assert_eq!(next.await, Ok(3));
    }

    #[tokio::test]
    async fn next_value_rejects_on_destroy() {
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);

        let next = link.next_value();
        link.destroy();
        assert_eq!(next.await, Err(Error::LinkClosed));
        assert_eq!(link.next_value().await, Err(Error::LinkClosed));
    }
}
