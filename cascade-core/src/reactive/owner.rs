//! Owner side-table.
//!
//! Binds signals and effects to an [`OwnerId`], the explicit identity of
//! some host object. Field-binding layers call these functions instead of
//! reaching into groups directly. Each owner is backed by the group
//! [`SignalGroup::find_or_create`] returns for it; nothing is reclaimed
//! until [`release_owner`] is called.

use super::effect::Effect;
use super::group::SignalGroup;
use super::link::LinkLike;
use super::signal::{Signal, SignalLike};
use super::OwnerId;
use crate::error::Result;

/// Store `signal` as the field `name` of `owner`, shadowing any earlier
/// binding of that name.
pub fn bind_field(owner: OwnerId, name: &str, signal: &dyn SignalLike) -> Result<()> {
    SignalGroup::find_or_create(owner).attach_signal_by_name(name, signal)
}

/// The signal bound as field `name` of `owner`.
pub fn find_field<T>(owner: OwnerId, name: &str) -> Option<Signal<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    SignalGroup::find(owner)?.signal(name)
}

/// Check if `owner` has a field called `name`.
pub fn has_field(owner: OwnerId, name: &str) -> bool {
    SignalGroup::find(owner).is_some_and(|group| group.has_signal(name))
}

/// Give `owner` ownership of `effect`.
pub fn bind_effect(owner: OwnerId, effect: &Effect) -> Result<()> {
    SignalGroup::find_or_create(owner).attach_effect(effect)
}

/// Give `owner` ownership of `link`.
pub fn bind_link(owner: OwnerId, link: &dyn LinkLike) -> Result<()> {
    SignalGroup::find_or_create(owner).attach_link(link)
}

/// Destroy everything bound to `owner` and forget it.
pub fn release_owner(owner: OwnerId) {
    if let Some(group) = SignalGroup::find(owner) {
        group.clear();
    }
}
