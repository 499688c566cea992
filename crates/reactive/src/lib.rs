//! Ripple Reactive - Observable state graphs with versioned snapshots.
//!
//! This crate turns plain nested objects and arrays into a graph of state
//! nodes whose mutations are versioned, propagated to every ancestor, and
//! exposed to consumers as cheap immutable snapshots. Consumers that record
//! what they read can skip work when a newer snapshot only differs
//! elsewhere.
//!
//! # Core Concepts
//!
//! - `StateNode`: a reactive object or array; `set`/`delete`/`push` advance
//!   the revision and notify listeners
//! - `Snapshot`: a deep immutable view of a node at one revision, cached
//!   per node and shared between unchanged subtrees
//! - `Affected` / `Tracked`: a record of the key paths read from a snapshot
//! - `has_changed`: compares two snapshots along the recorded paths only
//! - `Pending`: a value that is not available yet; reading it from a
//!   snapshot yields `Suspended`
//!
//! # Example
//!
//! ```
//! use ripple_reactive::{
//!     create_reactive, get_snapshot, has_changed, subscribe, wrap_with_path_tracking,
//!     Affected, Value,
//! };
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let state = create_reactive(Value::object([
//!     ("a", Value::from(1)),
//!     ("nested", Value::object([("b", 2)])),
//! ]))
//! .unwrap();
//!
//! let notified = Rc::new(Cell::new(0));
//! let counter = notified.clone();
//! let _handle = subscribe(&state, move |_| counter.set(counter.get() + 1));
//!
//! // Read `a` through a tracked view.
//! let prev = get_snapshot(&state);
//! let affected = Affected::new();
//! let a = wrap_with_path_tracking(&prev, &affected).get("a").unwrap().unwrap();
//! assert_eq!(a.as_i64(), Some(1));
//!
//! // A write elsewhere notifies, but does not affect what was read.
//! state.child("nested").unwrap().set("b", 3).unwrap();
//! assert_eq!(notified.get(), 1);
//! assert!(!has_changed(&prev, &get_snapshot(&state), &affected));
//!
//! state.set("a", 2).unwrap();
//! assert!(has_changed(&prev, &get_snapshot(&state), &affected));
//! ```

#![no_std]

extern crate alloc;

pub mod change;
pub mod node;
pub mod pending;
pub mod snapshot;
pub mod source;
pub mod subscription;
pub mod tracking;
pub mod value;

pub use change::{has_changed, has_changed_with, ChangeCache};
pub use node::{NodeId, StateNode};
pub use pending::{pending, Pending, PendingId, Rejection, Resolver, Settled};
pub use snapshot::{Snapshot, SnapshotId, SnapshotValue, Suspended};
pub use source::{MutableSource, Selector};
pub use subscription::{ListenerId, ListenerSet, RevisionCallback, Unsubscribe};
pub use tracking::{wrap_with_path_tracking, Affected, Tracked, TrackedValue};
pub use value::Value;

// Re-export the data model shared with the core crate
pub use ripple_core::{
    Clock, ClockRef, ContainerKind, Error, GlobalClock, Key, ManualClock, Path, Primitive,
    Result, Revision,
};

/// Wraps `initial` (an object, an array, or an existing node) in a new
/// state node on the process-wide clock.
pub fn create_reactive(initial: impl Into<Value>) -> Result<StateNode> {
    StateNode::new(initial)
}

/// Registers `callback` to run with the new revision after every mutation
/// reachable from `node`.
pub fn subscribe<F>(node: &StateNode, callback: F) -> Unsubscribe
where
    F: Fn(Revision) + 'static,
{
    node.subscribe(callback)
}

/// Returns the immutable snapshot of `node` at its current revision.
pub fn get_snapshot(node: &StateNode) -> Snapshot {
    node.snapshot()
}
