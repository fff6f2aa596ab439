//! Reactive Context
//!
//! The reactive context holds the ambient state every signal read and write
//! consults:
//!
//! - the effect stack: which effect is currently running, so that a signal
//!   read can register itself as a dependency of that effect;
//! - the open batch, if any, which collects triggered observers until the
//!   outermost batch scope closes;
//! - the quiet counter: while non-zero, reads do not register dependencies.
//!
//! # Implementation
//!
//! The state is thread-local. Every mutation of it goes through an RAII
//! guard (the [`ReactiveContext`] frame guard, [`QuietGuard`], the batch
//! scope and the hibernation guard), so the state is restored on every exit
//! path, including unwinding out of a user callback.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexSet;

use super::batch::Batch;
use super::effect::Effect;
use super::runtime::Observer;
use super::{BatchId, ObserverId, SignalId};

thread_local! {
    static CONTEXT: RefCell<ContextState> = RefCell::new(ContextState::default());
}

/// Everything ambient on this thread.
///
/// [`hibernate`](super::hibernate) swaps the whole value out and back in.
#[derive(Default)]
pub(crate) struct ContextState {
    stack: Vec<Frame>,
    batch: Option<Batch>,
    quiet: usize,
}

impl ContextState {
    pub(crate) fn batch_mut(&mut self) -> Option<&mut Batch> {
        self.batch.as_mut()
    }
}

/// An entry in the effect stack.
struct Frame {
    /// The running effect.
    effect: Effect,
    /// Static effects run with tracking switched off.
    tracking: bool,
    /// Signals read during this run, in first-read order.
    dependencies: IndexSet<SignalId>,
}

/// Guard that pops the effect frame when dropped.
///
/// This ensures the effect stack is properly maintained even if the effect
/// callback panics.
pub struct ReactiveContext {
    effect_id: ObserverId,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new frame for the given effect.
    ///
    /// While this frame is on top, signal reads are recorded against it
    /// (unless `tracking` is false or the context is quiet).
    pub(crate) fn enter(effect: Effect, tracking: bool) -> Self {
        let effect_id = effect.id();
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().stack.push(Frame {
                effect,
                tracking,
                dependencies: IndexSet::new(),
            });
        });

        Self {
            effect_id,
            finished: false,
        }
    }

    /// Pop the frame and hand back the signals read while it was on top.
    pub(crate) fn finish(mut self) -> IndexSet<SignalId> {
        self.finished = true;
        self.pop()
            .map(|frame| frame.dependencies)
            .unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let popped = CONTEXT.with(|ctx| ctx.borrow_mut().stack.pop());

        // Verify we're popping the right frame.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.effect.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {}, got {}",
                self.effect_id,
                frame.effect.id()
            );
        }
        popped
    }

    /// Check if an effect is currently running on this thread.
    pub fn is_active() -> bool {
        CONTEXT.with(|ctx| !ctx.borrow().stack.is_empty())
    }

    /// Check if a signal read right now would register a dependency.
    pub fn is_tracking() -> bool {
        CONTEXT.with(|ctx| {
            let ctx = ctx.borrow();
            ctx.quiet == 0 && ctx.stack.last().is_some_and(|frame| frame.tracking)
        })
    }

    /// The effect on top of the stack, if any.
    pub fn current_effect() -> Option<Effect> {
        CONTEXT.with(|ctx| ctx.borrow().stack.last().map(|frame| frame.effect.clone()))
    }

    /// Number of effects currently running, innermost included.
    pub fn depth() -> usize {
        CONTEXT.with(|ctx| ctx.borrow().stack.len())
    }

    /// Record a dependency on the given signal.
    ///
    /// This is called by signals when they are read.
    pub(crate) fn track(signal_id: SignalId) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.quiet > 0 {
                return;
            }
            if let Some(frame) = ctx.stack.last_mut() {
                if frame.tracking {
                    frame.dependencies.insert(signal_id);
                }
            }
        });
    }

    /// Get the dependencies collected so far in the current frame.
    pub fn dependencies() -> Vec<SignalId> {
        CONTEXT.with(|ctx| {
            ctx.borrow()
                .stack
                .last()
                .map(|frame| frame.dependencies.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Check if a batch is open on this thread.
    pub fn is_batching() -> bool {
        CONTEXT.with(|ctx| ctx.borrow().batch.is_some())
    }

    /// Install `batch` as the ambient batch unless one is already open.
    ///
    /// Returns false (and drops `batch`) if a batch was already open.
    pub(crate) fn open_batch(batch: Batch) -> bool {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.batch.is_some() {
                return false;
            }
            ctx.batch = Some(batch);
            true
        })
    }

    /// Remove the ambient batch if it is the one identified by `id`.
    pub(crate) fn close_batch(id: BatchId) -> Option<Batch> {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.batch.as_ref().map(Batch::id) == Some(id) {
                ctx.batch.take()
            } else {
                None
            }
        })
    }

    /// Queue an observer on the open batch.
    ///
    /// Returns false if no batch is open; the caller must then run the
    /// observer itself.
    pub(crate) fn enqueue(observer: Arc<dyn Observer>) -> bool {
        CONTEXT.with(|ctx| match ctx.borrow_mut().batch.as_mut() {
            Some(batch) => {
                batch.enqueue(observer);
                true
            }
            None => false,
        })
    }

    /// Take the whole ambient state, leaving a pristine one behind.
    pub(crate) fn suspend() -> ContextState {
        CONTEXT.with(|ctx| std::mem::take(&mut *ctx.borrow_mut()))
    }

    /// Reinstate a state taken by [`suspend`](Self::suspend).
    ///
    /// Returns whatever was ambient at the time of the call.
    pub(crate) fn resume(state: ContextState) -> ContextState {
        CONTEXT.with(|ctx| std::mem::replace(&mut *ctx.borrow_mut(), state))
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Guard that silences dependency registration while alive.
pub(crate) struct QuietGuard {
    _private: (),
}

impl QuietGuard {
    pub(crate) fn new() -> Self {
        CONTEXT.with(|ctx| ctx.borrow_mut().quiet += 1);
        Self { _private: () }
    }
}

impl Drop for QuietGuard {
    fn drop(&mut self) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            ctx.quiet = ctx.quiet.saturating_sub(1);
        });
    }
}
