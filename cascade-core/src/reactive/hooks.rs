//! One-shot destroy notifications.
//!
//! Signals, effects, links and groups each carry a [`DestroyHooks`] list.
//! Hooks fire exactly once, when the owner is destroyed; a hook registered
//! after that point runs immediately.

use parking_lot::Mutex;
use smallvec::SmallVec;

/// A callback run once when its owner is destroyed.
pub type DestroyHook = Box<dyn FnOnce() + Send>;

enum HookState {
    Armed(SmallVec<[DestroyHook; 2]>),
    Fired,
}

pub(crate) struct DestroyHooks {
    state: Mutex<HookState>,
}

impl DestroyHooks {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(HookState::Armed(SmallVec::new())),
        }
    }

    /// Register a hook, or run it now if the owner is already gone.
    pub(crate) fn push(&self, hook: DestroyHook) {
        let mut state = self.state.lock();
        match &mut *state {
            HookState::Armed(hooks) => hooks.push(hook),
            HookState::Fired => {
                drop(state);
                hook();
            }
        }
    }

    /// Run every registered hook. Later calls are no-ops.
    ///
    /// Hooks run outside the lock so they may freely call back into the
    /// owner.
    pub(crate) fn fire(&self) {
        let hooks = match std::mem::replace(&mut *self.state.lock(), HookState::Fired) {
            HookState::Armed(hooks) => hooks,
            HookState::Fired => return,
        };
        for hook in hooks {
            hook();
        }
    }
}

impl Default for DestroyHooks {
    fn default() -> Self {
        Self::new()
    }
}
