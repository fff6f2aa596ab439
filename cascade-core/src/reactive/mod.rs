//! Reactive Primitives
//!
//! This module implements the reactive runtime: signals, effects and memos,
//! plus the machinery that keeps a changing graph of them consistent.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read while
//! an effect runs, the effect becomes a dependent. When the signal changes,
//! every dependent is notified.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever a signal
//! it read last time changes. Dependencies are re-discovered on every run,
//! so a branch not taken stops triggering the effect.
//!
//! ## Memos
//!
//! A Memo is a cached derived value: a signal written by a dedicated
//! effect. It re-evaluates only when one of its inputs changes.
//!
//! ## Batches
//!
//! A batch defers every triggered effect until its outermost scope closes,
//! then runs each one exactly once in descending priority order.
//!
//! ## Groups and Links
//!
//! A [`SignalGroup`] owns signals, effects, links and child groups and
//! destroys them together. A [`Link`] keeps a target in sync with a source
//! signal.
//!
//! # Implementation Notes
//!
//! The ambient state (the running effect stack, the open batch and the
//! quiet counter) is thread-local and only ever changed through scoped
//! guards, so it is restored on every exit path. The signal channel that
//! routes notifications from signals to observers is process-wide.

mod id;
mod hooks;
mod context;
mod runtime;
mod batch;
mod signal;
mod effect;
mod memo;
mod hibernate;
mod group;
mod link;
mod connection;
mod owner;

pub use id::{BatchId, GroupId, ObserverId, OwnerId, SignalId};
pub use hooks::DestroyHook;
pub use context::ReactiveContext;
pub use runtime::{Change, Runtime};
pub use batch::{batch, is_batching, Batch};
pub use signal::{
    create_signal, destroy_signal, touch, value, BeforeReadFn, CompareFn, LazyFn, SetOptions,
    Signal, SignalLike, SignalOptions, SignalRead,
};
pub use effect::{create_effect, Cleanup, Effect, EffectOptions, IntoCleanup};
pub use memo::{create_memo, Memo, MemoOptions, DERIVED_PRIORITY};
pub use hibernate::{be_quiet, hibernate};
pub use group::SignalGroup;
pub use link::{
    link, link_with, unlink, Link, LinkEvent, LinkLike, LinkOptions, LinkTarget, NextValue,
    SetterFn, TargetKind, LINK_EVENT_CAPACITY,
};
pub use connection::{connect, unconnect, Connection, ConnectionTarget, ConnectionType};
pub use owner::{bind_effect, bind_field, bind_link, find_field, has_field, release_owner};
