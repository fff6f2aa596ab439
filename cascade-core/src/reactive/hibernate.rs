//! Context suspension.
//!
//! [`be_quiet`] silences dependency registration for the duration of a
//! closure. [`hibernate`] goes further: it takes the whole ambient reactive
//! context (effect stack, open batch, quiet counter) out of the thread,
//! runs the closure as if no reactive code were on the stack, and puts the
//! context back afterwards, on every exit path.

use tracing::trace;

use super::batch;
use super::context::{ContextState, QuietGuard, ReactiveContext};

/// Run `f` without registering any signal read as a dependency.
///
/// ```rust,ignore
/// Effect::new(move || {
///     let tracked = a.get();
///     let silent = be_quiet(|| b.get());  // `b` is not a dependency
/// });
/// ```
pub fn be_quiet<R>(f: impl FnOnce() -> R) -> R {
    let _quiet = QuietGuard::new();
    f()
}

/// Holds the suspended context and restores it on drop.
struct Hibernation {
    saved: Option<ContextState>,
}

impl Hibernation {
    fn begin() -> Self {
        // Built before flushing so a panicking observer still restores.
        let mut hibernation = Self {
            saved: Some(ReactiveContext::suspend()),
        };

        // Writes queued by a still-open outer batch land before `f` runs.
        let outer = hibernation
            .saved
            .as_mut()
            .and_then(|saved| saved.batch_mut())
            .map(|outer| (outer.id(), outer.take_queue()));
        if let Some((id, pending)) = outer {
            trace!(batch = %id, pending = pending.len(), "hibernating");
            batch::flush(id, pending);
        }

        hibernation
    }
}

impl Drop for Hibernation {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            ReactiveContext::resume(saved);
        }
    }
}

/// Run `f` with the ambient reactive context fully suspended.
///
/// Inside `f` no effect is running, no batch is open and reads are tracked
/// normally again (by effects `f` itself creates). Work already queued on
/// an open outer batch is flushed before `f` starts. The outer context is
/// restored when `f` returns or unwinds.
pub fn hibernate<R>(f: impl FnOnce() -> R) -> R {
    let _hibernation = Hibernation::begin();
    f()
}
