//! The narrow contract a rendering layer consumes, plus a selective reader
//! built on top of it.

use crate::change::{has_changed_with, ChangeCache};
use crate::node::StateNode;
use crate::snapshot::Snapshot;
use crate::subscription::Unsubscribe;
use crate::tracking::{wrap_with_path_tracking, Affected, Tracked};
use alloc::boxed::Box;
use ripple_core::Revision;

/// A versioned value that can be read and observed.
pub trait MutableSource {
    /// Returns the current version. Changes whenever `snapshot` would.
    fn version(&self) -> Revision;

    /// Returns the current immutable value.
    fn snapshot(&self) -> Snapshot;

    /// Registers `callback` to run after every change.
    fn subscribe(&self, callback: Box<dyn Fn(Revision)>) -> Unsubscribe;
}

impl MutableSource for StateNode {
    fn version(&self) -> Revision {
        self.revision()
    }

    fn snapshot(&self) -> Snapshot {
        StateNode::snapshot(self)
    }

    fn subscribe(&self, callback: Box<dyn Fn(Revision)>) -> Unsubscribe {
        StateNode::subscribe(self, callback)
    }
}

/// Hands out snapshots of a source, reusing the previous one while nothing
/// the last [`read`](Selector::read) touched has changed.
///
/// # Example
///
/// ```
/// use ripple_reactive::{Selector, StateNode, Value};
///
/// let state = StateNode::new(Value::object([("a", 1), ("b", 2)])).unwrap();
/// let mut selector = Selector::new(state.clone());
///
/// let a = selector.read(|view| view.get("a").unwrap().unwrap().as_i64());
/// assert_eq!(a, Some(1));
/// let seen = selector.snapshot();
///
/// state.set("b", 20).unwrap();
/// assert!(selector.snapshot().ptr_eq(&seen));
///
/// state.set("a", 10).unwrap();
/// assert!(!selector.snapshot().ptr_eq(&seen));
/// ```
pub struct Selector<S> {
    source: S,
    current: Option<Snapshot>,
    affected: Affected,
    cache: ChangeCache,
}

impl<S: MutableSource> Selector<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: None,
            affected: Affected::new(),
            cache: ChangeCache::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the version of the underlying source.
    pub fn version(&self) -> Revision {
        self.source.version()
    }

    /// Returns the reads committed by the last [`read`](Selector::read).
    pub fn affected(&self) -> &Affected {
        &self.affected
    }

    /// Returns the source's snapshot, or the previously returned one when
    /// no committed read differs between the two.
    pub fn snapshot(&mut self) -> Snapshot {
        let next = self.source.snapshot();
        if let Some(prev) = &self.current {
            if !has_changed_with(prev, &next, &self.affected, &mut self.cache) {
                return prev.clone();
            }
        }
        self.current = Some(next.clone());
        next
    }

    /// Runs `f` against a tracked view of [`snapshot`](Selector::snapshot)
    /// and commits what it read for the next comparison.
    pub fn read<R>(&mut self, f: impl FnOnce(Tracked<'_>) -> R) -> R {
        let snapshot = self.snapshot();
        let affected = Affected::new();
        let result = f(wrap_with_path_tracking(&snapshot, &affected));
        self.affected = affected;
        self.cache.clear();
        result
    }

    /// Subscribes to the underlying source.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(Revision) + 'static,
    {
        self.source.subscribe(Box::new(callback))
    }
}
