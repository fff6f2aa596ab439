//! Error types for cascade-core.
//!
//! Only programmer misuse surfaces as an error: attaching to a destroyed
//! group, attaching something already destroyed, or building a group cycle.
//! Reads and writes against destroyed signals are tolerated silently.

use thiserror::Error;

use crate::reactive::{GroupId, ObserverId, SignalId};

/// Result type for cascade-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cascade-core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The group has been cleared and no longer accepts members.
    #[error("signal group {0} is destroyed")]
    GroupDestroyed(GroupId),

    /// A destroyed signal cannot be attached to a group.
    #[error("cannot attach destroyed signal {0}")]
    SignalDestroyed(SignalId),

    /// A destroyed link cannot be attached to a group.
    #[error("cannot attach destroyed link {0}")]
    LinkDestroyed(ObserverId),

    /// A group was attached to itself.
    #[error("signal group {0} cannot be attached to itself")]
    SelfAttach(GroupId),

    /// Attaching the group would make it its own ancestor.
    #[error("attaching group {child} to {parent} would create a cycle")]
    Cycle {
        parent: GroupId,
        child: GroupId,
    },

    /// The link was destroyed before the awaited value arrived.
    #[error("link closed")]
    LinkClosed,
}
