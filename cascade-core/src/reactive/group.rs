//! Signal Groups
//!
//! A group is an ownership aggregator. It holds signals, effects, links and
//! child groups, resolves named signals through a parent-delegating lookup
//! chain, and tears everything down in one `clear()`.
//!
//! # Named Signals
//!
//! Several signals may be registered under one name. The most recently
//! attached one is active; detaching it (or destroying it) reveals the one
//! below. Lookup checks the group's own names first and then asks the
//! parent, so a child group's bindings shadow its parent's.
//!
//! # Owners
//!
//! [`SignalGroup::find_or_create`] keeps one group per [`OwnerId`] in a
//! process-wide registry. The entry is removed when the group is cleared.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::effect::Effect;
use super::hooks::DestroyHooks;
use super::link::LinkLike;
use super::memo::Memo;
use super::signal::{Signal, SignalLike};
use super::{GroupId, ObserverId, OwnerId, SignalId};
use crate::error::{Error, Result};

static REGISTRY: OnceLock<DashMap<OwnerId, SignalGroup>> = OnceLock::new();

fn registry() -> &'static DashMap<OwnerId, SignalGroup> {
    REGISTRY.get_or_init(DashMap::new)
}

#[derive(Default)]
struct GroupState {
    signals: IndexMap<SignalId, Arc<dyn SignalLike>>,
    /// Override stack per name; the last entry is active.
    named: HashMap<String, Vec<Arc<dyn SignalLike>>>,
    children: IndexMap<GroupId, SignalGroup>,
    effects: IndexMap<ObserverId, Effect>,
    links: IndexMap<ObserverId, Arc<dyn LinkLike>>,
    parent: Option<Weak<GroupInner>>,
    destroyed: bool,
}

struct GroupInner {
    id: GroupId,
    owner: Option<OwnerId>,
    state: Mutex<GroupState>,
    hooks: DestroyHooks,
}

/// An ownership and lookup scope for reactive state.
#[derive(Clone)]
pub struct SignalGroup {
    inner: Arc<GroupInner>,
}

impl SignalGroup {
    /// Create a group not bound to any owner.
    pub fn new() -> Self {
        Self::with_owner(None)
    }

    fn with_owner(owner: Option<OwnerId>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                id: GroupId::new(),
                owner,
                state: Mutex::new(GroupState::default()),
                hooks: DestroyHooks::new(),
            }),
        }
    }

    /// The group owned by `owner`, created on first use.
    pub fn find_or_create(owner: OwnerId) -> Self {
        registry()
            .entry(owner)
            .or_insert_with(|| Self::with_owner(Some(owner)))
            .clone()
    }

    /// The group owned by `owner`, if one exists.
    pub fn find(owner: OwnerId) -> Option<Self> {
        registry().get(&owner).map(|group| group.clone())
    }

    /// Get the group's unique ID.
    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    /// The owner this group was created for, if any.
    pub fn owner(&self) -> Option<OwnerId> {
        self.inner.owner
    }

    /// Check if the group has been cleared.
    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::GroupDestroyed(self.inner.id));
        }
        Ok(())
    }

    fn downgrade(&self) -> Weak<GroupInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<GroupInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    /// Take ownership of a signal.
    pub fn attach_signal(&self, signal: &dyn SignalLike) -> Result<()> {
        self.ensure_alive()?;
        if signal.is_destroyed() {
            return Err(Error::SignalDestroyed(signal.signal_id()));
        }

        let id = signal.signal_id();
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(Error::GroupDestroyed(self.inner.id));
            }
            if state.signals.contains_key(&id) {
                return Ok(());
            }
            state.signals.insert(id, signal.erase());
        }

        let weak = self.downgrade();
        signal.on_destroy_boxed(Box::new(move || {
            if let Some(group) = Self::upgrade(&weak) {
                group.forget_signal(id);
            }
        }));
        Ok(())
    }

    /// Take ownership of a signal and make it the active binding for
    /// `name`, shadowing any earlier binding.
    pub fn attach_signal_by_name(&self, name: &str, signal: &dyn SignalLike) -> Result<()> {
        self.attach_signal(signal)?;
        self.inner
            .state
            .lock()
            .named
            .entry(name.to_owned())
            .or_default()
            .push(signal.erase());
        Ok(())
    }

    /// Remove every binding of `name`. The signals stay attached.
    pub fn remove_signal_name(&self, name: &str) {
        self.inner.state.lock().named.remove(name);
    }

    /// Release a signal without destroying it, revealing any binding it
    /// shadowed.
    pub fn detach_signal(&self, signal: &dyn SignalLike) {
        self.forget_signal(signal.signal_id());
    }

    fn forget_signal(&self, id: SignalId) {
        let mut state = self.inner.state.lock();
        state.signals.shift_remove(&id);
        state.named.retain(|_, stack| {
            stack.retain(|signal| signal.signal_id() != id);
            !stack.is_empty()
        });
    }

    fn resolve(&self, name: &str) -> Option<Arc<dyn SignalLike>> {
        let (local, parent) = {
            let state = self.inner.state.lock();
            (
                state.named.get(name).and_then(|stack| stack.last()).cloned(),
                state.parent.clone(),
            )
        };
        match local {
            Some(signal) => Some(signal),
            None => parent.and_then(|weak| Self::upgrade(&weak))?.resolve(name),
        }
    }

    /// The active signal bound to `name` here or in an ancestor.
    ///
    /// Returns `None` if the name is unbound or bound to a different value
    /// type.
    pub fn signal<T>(&self, name: &str) -> Option<Signal<T>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let found = self.resolve(name)?;
        let any: &dyn Any = found.as_any();
        any.downcast_ref::<Signal<T>>()
            .cloned()
            .or_else(|| any.downcast_ref::<Memo<T>>().map(|memo| memo.signal().clone()))
    }

    /// Check if `name` resolves here or in an ancestor.
    pub fn has_signal(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Number of signals attached directly to this group.
    pub fn signal_count(&self) -> usize {
        self.inner.state.lock().signals.len()
    }

    // ------------------------------------------------------------------
    // Effects and links
    // ------------------------------------------------------------------

    /// Take ownership of an effect.
    pub fn attach_effect(&self, effect: &Effect) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(Error::GroupDestroyed(self.inner.id));
            }
            state.effects.insert(effect.id(), effect.clone());
        }

        let weak = self.downgrade();
        let id = effect.id();
        effect.on_destroy(move || {
            if let Some(group) = Self::upgrade(&weak) {
                group.inner.state.lock().effects.shift_remove(&id);
            }
        });
        Ok(())
    }

    /// Release an effect without destroying it.
    pub fn detach_effect(&self, effect: &Effect) {
        self.inner.state.lock().effects.shift_remove(&effect.id());
    }

    /// Number of effects attached directly to this group.
    pub fn effect_count(&self) -> usize {
        self.inner.state.lock().effects.len()
    }

    /// Take ownership of a link.
    pub fn attach_link(&self, link: &dyn LinkLike) -> Result<()> {
        self.ensure_alive()?;
        if link.is_destroyed() {
            return Err(Error::LinkDestroyed(link.link_id()));
        }

        let id = link.link_id();
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(Error::GroupDestroyed(self.inner.id));
            }
            state.links.insert(id, link.erase());
        }

        let weak = self.downgrade();
        link.on_destroy_boxed(Box::new(move || {
            if let Some(group) = Self::upgrade(&weak) {
                group.inner.state.lock().links.shift_remove(&id);
            }
        }));
        Ok(())
    }

    /// Number of links attached directly to this group.
    pub fn link_count(&self) -> usize {
        self.inner.state.lock().links.len()
    }

    /// Run every attached effect, then recurse into child groups.
    pub fn run_effects(&self) {
        let (effects, children) = {
            let state = self.inner.state.lock();
            (
                state.effects.values().cloned().collect::<Vec<_>>(),
                state.children.values().cloned().collect::<Vec<_>>(),
            )
        };
        for effect in effects {
            effect.run();
        }
        for child in children {
            child.run_effects();
        }
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Make `child` a child of this group, detaching it from any previous
    /// parent.
    pub fn attach_group(&self, child: &SignalGroup) -> Result<()> {
        if child.id() == self.id() {
            return Err(Error::SelfAttach(self.id()));
        }
        self.ensure_alive()?;
        child.ensure_alive()?;

        let mut ancestor = self.parent();
        while let Some(group) = ancestor {
            if group.id() == child.id() {
                return Err(Error::Cycle {
                    parent: self.id(),
                    child: child.id(),
                });
            }
            ancestor = group.parent();
        }

        child.detach_from_parent();
        {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return Err(Error::GroupDestroyed(self.inner.id));
            }
            state.children.insert(child.id(), child.clone());
        }
        child.inner.state.lock().parent = Some(self.downgrade());
        Ok(())
    }

    /// Release a child group without clearing it.
    pub fn detach_group(&self, child: &SignalGroup) {
        let removed = self.inner.state.lock().children.shift_remove(&child.id());
        if removed.is_some() {
            child.inner.state.lock().parent = None;
        }
    }

    fn detach_from_parent(&self) {
        let parent = self.inner.state.lock().parent.take();
        if let Some(parent) = parent.and_then(|weak| Self::upgrade(&weak)) {
            parent.inner.state.lock().children.shift_remove(&self.id());
        }
    }

    /// The parent group, if any.
    pub fn parent(&self) -> Option<SignalGroup> {
        let parent = self.inner.state.lock().parent.clone();
        parent.and_then(|weak| Self::upgrade(&weak))
    }

    /// Number of direct child groups.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Destroy everything the group owns.
    ///
    /// Child groups are cleared first, then effects, signals and links are
    /// destroyed; finally the group leaves its parent and the owner
    /// registry and fires its destroy notification. Idempotent.
    pub fn clear(&self) {
        let (children, effects, signals, links, parent) = {
            let mut state = self.inner.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.named.clear();
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.effects),
                std::mem::take(&mut state.signals),
                std::mem::take(&mut state.links),
                state.parent.take(),
            )
        };

        debug!(
            group = %self.inner.id,
            children = children.len(),
            effects = effects.len(),
            signals = signals.len(),
            links = links.len(),
            "clearing signal group"
        );

        for child in children.into_values() {
            child.clear();
        }
        for effect in effects.into_values() {
            effect.destroy();
        }
        for signal in signals.into_values() {
            signal.destroy();
        }
        for link in links.into_values() {
            link.destroy();
        }

        if let Some(parent) = parent.and_then(|weak| Self::upgrade(&weak)) {
            parent.inner.state.lock().children.shift_remove(&self.inner.id);
        }
        if let Some(owner) = self.inner.owner {
            registry().remove_if(&owner, |_, group| group.id() == self.inner.id);
        }

        self.inner.hooks.fire();
    }

    /// Destroy everything the group owns.
    #[deprecated(note = "use `clear` instead")]
    pub fn destroy(&self) {
        self.clear();
    }

    /// Run `hook` once when the group is cleared.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.hooks.push(Box::new(hook));
    }
}

impl Default for SignalGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SignalGroup {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for SignalGroup {}

impl std::fmt::Debug for SignalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SignalGroup")
            .field("id", &self.inner.id)
            .field("owner", &self.inner.owner)
            .field("signals", &state.signals.len())
            .field("effects", &state.effects.len())
            .field("links", &state.links.len())
            .field("children", &state.children.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{link, EffectOptions};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn named_signals_shadow_and_reveal() {
        let group = SignalGroup::new();
        let first = Signal::new(1);
        let second = Signal::new(2);

        group.attach_signal_by_name("value", &first).unwrap();
        group.attach_signal_by_name("value", &second).unwrap();
        assert_eq!(group.signal::<i32>("value"), Some(second.clone()));

        group.detach_signal(&second);
        assert_eq!(group.signal::<i32>("value"), Some(first.clone()));

        group.remove_signal_name("value");
        assert!(!group.has_signal("value"));
        assert_eq!(group.signal_count(), 1);
    }

    #[test]
    fn destroyed_signal_reveals_previous_binding() {
        let group = SignalGroup::new();
        let first = Signal::new(1);
        let second = Signal::new(2);

        group.attach_signal_by_name("value", &first).unwrap();
        group.attach_signal_by_name("value", &second).unwrap();
        second.destroy();

        assert_eq!(group.signal::<i32>("value"), Some(first));
    }

    #[test]
    fn lookup_delegates_to_parent() {
        let parent = SignalGroup::new();
        let child = SignalGroup::new();
        parent.attach_group(&child).unwrap();

        let inherited = Signal::new("parent");
        parent.attach_signal_by_name("label", &inherited).unwrap();
        assert_eq!(child.signal::<&str>("label").map(|s| s.get()), Some("parent"));

        let shadow = Signal::new("child");
        child.attach_signal_by_name("label", &shadow).unwrap();
        assert_eq!(child.signal::<&str>("label").map(|s| s.get()), Some("child"));
        assert_eq!(parent.signal::<&str>("label").map(|s| s.get()), Some("parent"));

        // Wrong type does not resolve
        assert!(child.signal::<i32>("label").is_none());
    }

    #[test]
    fn group_has_single_parent() {
        let first = SignalGroup::new();
        let second = SignalGroup::new();
        let child = SignalGroup::new();

        first.attach_group(&child).unwrap();
        second.attach_group(&child).unwrap();

        assert_eq!(first.child_count(), 0);
        assert_eq!(second.child_count(), 1);
        assert_eq!(child.parent(), Some(second));
    }

    #[test]
    fn attach_errors() {
        let group = SignalGroup::new();
        assert_eq!(
            group.attach_group(&group),
            Err(Error::SelfAttach(group.id()))
        );

        let child = SignalGroup::new();
        group.attach_group(&child).unwrap();
        assert!(matches!(child.attach_group(&group), Err(Error::Cycle { .. })));

        let dead = Signal::new(0);
        dead.destroy();
        assert_eq!(
            group.attach_signal(&dead),
            Err(Error::SignalDestroyed(dead.id()))
        );

        group.clear();
        assert_eq!(
            group.attach_signal(&Signal::new(0)),
            Err(Error::GroupDestroyed(group.id()))
        );
        assert!(group.attach_effect(&Effect::new(|| {})).is_err());
    }

    #[test]
    fn attach_destroyed_link_fails() {
        let group = SignalGroup::new();
        let source = Signal::new(0);
        let target = Signal::new(0);
        let link = link(&source, &target);
        link.destroy();

        assert_eq!(
            group.attach_link(&link),
            Err(Error::LinkDestroyed(link.id()))
        );
    }

    #[test]
    fn clear_cascades_and_notifies_once() {
        let parent = SignalGroup::new();
        let child = SignalGroup::new();
        parent.attach_group(&child).unwrap();

        let signal = Signal::new(0);
        child.attach_signal(&signal).unwrap();
        let effect = Effect::with_options(|| {}, EffectOptions::default().attach(&parent)).unwrap();
        assert_eq!(parent.effect_count(), 1);

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        parent.on_destroy(move || {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });

        parent.clear();
        parent.clear();

        assert!(child.is_destroyed());
        assert!(signal.is_destroyed());
        assert!(effect.is_destroyed());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_effects_visits_children() {
        let parent = SignalGroup::new();
        let child = SignalGroup::new();
        parent.attach_group(&child).unwrap();

        let runs = Arc::new(AtomicI32::new(0));
        for group in [&parent, &child] {
            let runs = runs.clone();
            Effect::with_options(
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                },
                EffectOptions::default().attach(group),
            )
            .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        parent.run_effects();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn owner_registry_round_trip() {
        let owner = OwnerId::new();
        let group = SignalGroup::find_or_create(owner);
        assert_eq!(SignalGroup::find_or_create(owner), group);
        assert_eq!(group.owner(), Some(owner));

        group.clear();
        assert!(SignalGroup::find(owner).is_none());
        assert_ne!(SignalGroup::find_or_create(owner), group);
    }
}
