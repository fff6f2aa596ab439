//! Connections
//!
//! The older face of [`Link`]: the same synchronization channel, with a
//! [`ConnectionType`] tag describing the target shape and one extra target
//! shape, an owner's method.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::hooks::DestroyHook;
use super::link::{link, unlink, Link, LinkEvent, LinkLike, LinkTarget, NextValue};
use super::signal::Signal;
use super::{ObserverId, OwnerId};

/// The shape of a connection's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    Signal,
    Function,
    Property,
    Method,
}

/// The target of a [`Connection`].
pub struct ConnectionTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    kind: ConnectionType,
    target: LinkTarget<T>,
}

impl<T> ConnectionTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Connect into another signal.
    pub fn signal(signal: &Signal<T>) -> Self {
        Self {
            kind: ConnectionType::Signal,
            target: LinkTarget::signal(signal),
        }
    }

    /// Connect into a plain function.
    pub fn function(f: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            kind: ConnectionType::Function,
            target: LinkTarget::callback(f),
        }
    }

    /// Connect into the property `name` of `owner`.
    pub fn property(
        owner: OwnerId,
        name: impl Into<String>,
        setter: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ConnectionType::Property,
            target: LinkTarget::property(owner, name, setter),
        }
    }

    /// Connect into the method `name` of `owner`, called with each value.
    pub fn method(
        owner: OwnerId,
        name: impl Into<String>,
        method: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ConnectionType::Method,
            target: LinkTarget::method(owner, name, method),
        }
    }

    /// The target shape.
    pub fn kind(&self) -> ConnectionType {
        self.kind
    }
}

impl<T> Clone for ConnectionTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            target: self.target.clone(),
        }
    }
}

impl<T> From<&Signal<T>> for ConnectionTarget<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn from(signal: &Signal<T>) -> Self {
        Self::signal(signal)
    }
}

/// A tagged [`Link`].
pub struct Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    link: Link<T>,
    kind: ConnectionType,
}

impl<T> Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// The target shape.
    pub fn kind(&self) -> ConnectionType {
        self.kind
    }

    /// The underlying link.
    pub fn link(&self) -> &Link<T> {
        &self.link
    }

    /// Stop propagating source changes.
    pub fn mute(&self) {
        self.link.mute();
    }

    /// Resume propagating source changes.
    pub fn unmute(&self) {
        self.link.unmute();
    }

    /// Flip the muted state.
    pub fn toggle(&self) {
        self.link.toggle();
    }

    /// Check if the connection is muted.
    pub fn is_muted(&self) -> bool {
        self.link.is_muted()
    }

    /// Write the source's current value through now, even while muted.
    pub fn touch(&self) {
        self.link.touch();
    }

    /// Resolve with the next value written through.
    pub fn next_value(&self) -> NextValue<T> {
        self.link.next_value()
    }

    /// Subscribe to mute, unmute and destroy events.
    pub fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.link.events()
    }

    /// Destroy the connection, leaving both endpoints alone.
    pub fn destroy(&self) {
        self.link.destroy();
    }

    /// Check if the connection has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.link.is_destroyed()
    }
}

impl<T> Clone for Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            kind: self.kind,
        }
    }
}

impl<T> PartialEq for Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind)
            .field("link", &self.link)
            .finish()
    }
}

impl<T> LinkLike for Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn link_id(&self) -> ObserverId {
        self.link.id()
    }

    fn is_destroyed(&self) -> bool {
        self.link.is_destroyed()
    }

    fn destroy(&self) {
        self.link.destroy();
    }

    fn on_destroy_boxed(&self, hook: DestroyHook) {
        self.link.on_destroy_boxed(hook);
    }

    fn erase(&self) -> Arc<dyn LinkLike> {
        Arc::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Connect `source` to `target`, or return the live connection between
/// them.
pub fn connect<T>(source: &Signal<T>, target: impl Into<ConnectionTarget<T>>) -> Connection<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let target = target.into();
    Connection {
        kind: target.kind,
        link: link(source, target.target),
    }
}

/// Destroy the connection from `source` to `target`, or every connection
/// leaving `source` if `target` is `None`.
pub fn unconnect<T>(source: &Signal<T>, target: Option<&ConnectionTarget<T>>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    unlink(source, target.map(|target| &target.target));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::SignalGroup;
    use parking_lot::Mutex;

    #[test]
    fn connect_tags_target_shape() {
        let source = Signal::new(1);
        let target = Signal::new(0);

        let connection = connect(&source, &target);
        assert_eq!(connection.kind(), ConnectionType::Signal);
        assert_eq!(target.get(), 1);

        let owner = OwnerId::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let method = connect(
            &source,
            ConnectionTarget::method(owner, "on_change", move |v: i32| calls_clone.lock().push(v)),
        );
        assert_eq!(method.kind(), ConnectionType::Method);

        source.set(2);
        assert_eq!(target.get(), 2);
        assert_eq!(*calls.lock(), vec![1, 2]);
    }

    #[test]
    fn method_and_property_with_same_name_are_distinct() {
        let owner = OwnerId::new();
        let source = Signal::new(0);

        let property = connect(&source, ConnectionTarget::property(owner, "value", |_: i32| {}));
        let method = connect(&source, ConnectionTarget::method(owner, "value", |_: i32| {}));
        assert_ne!(property, method);
    }

    #[test]
    fn unconnect_destroys_connection() {
        let source = Signal::new(0);
        let target = ConnectionTarget::function(|_: i32| {});
        let connection = connect(&source, target.clone());

        unconnect(&source, Some(&target));
        assert!(connection.is_destroyed());
    }

    #[test]
    fn connection_attaches_to_group() {
        let group = SignalGroup::new();
        let source = Signal::new(0);
        let target = Signal::new(0);
        let connection = connect(&source, &target);

        group.attach_link(&connection).unwrap();
        assert_eq!(group.link_count(), 1);

        group.clear();
        assert!(connection.is_destroyed());
        assert!(!source.is_destroyed());
        assert!(!target.is_destroyed());
    }
}
