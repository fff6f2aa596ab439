//! Identity types for the reactive system.
//!
//! Every signal, effect, link, batch, group and owner gets an opaque id
//! when it is created. All ids are drawn from one process-wide counter, so
//! two ids never collide even across kinds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Draw the next raw id from the process-wide counter.
///
/// Uses an atomic counter to ensure uniqueness across threads. Zero is
/// never issued.
fn next_raw() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

macro_rules! reactive_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Generate a new unique id.
            pub fn new() -> Self {
                Self(next_raw())
            }

            /// Get the raw id value.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

reactive_id!(
    /// Unique identifier for a signal.
    ///
    /// The id is the key under which the signal's change notifications are
    /// published on the signal channel.
    SignalId,
    "sig"
);

reactive_id!(
    /// Unique identifier for anything that observes signals.
    ///
    /// Effects and links share this id space because both sit in the same
    /// batch queue.
    ObserverId,
    "obs"
);

reactive_id!(
    /// Unique identifier for a batch scope.
    BatchId,
    "batch"
);

reactive_id!(
    /// Unique identifier for a signal group.
    GroupId,
    "group"
);

reactive_id!(
    /// Stable identity for an object that owns reactive state.
    ///
    /// Embed one in any struct that binds signals by name. The owner's
    /// bindings live until [`release_owner`](crate::reactive::release_owner)
    /// is called; nothing is reclaimed in the background.
    OwnerId,
    "owner"
);
