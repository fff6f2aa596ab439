//! Cascade Core
//!
//! This crate provides a fine-grained reactive dataflow runtime. It
//! implements:
//!
//! - Reactive primitives (signals, effects, memos)
//! - Batched, priority-ordered propagation
//! - Nested effect trees with cleanup and cascading destruction
//! - Signal groups for ownership and named lookup
//! - Links that keep a target synchronized with a source signal
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the primitives, the signal channel and the ambient context
//! - `error`: the error type returned by misuse of groups and links
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_core::reactive::{batch, Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Memo::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! Effect::new(move || {
//!     println!("Doubled: {}", doubled.get());
//! });
//!
//! // Update the signal; the effect runs once for both writes
//! batch(|| {
//!     count.set(4);
//!     count.set(5);
//! });
//! // Prints: "Doubled: 10"
//! ```

pub mod error;
pub mod reactive;

pub use error::{Error, Result};
