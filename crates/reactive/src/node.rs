//! State nodes and the ownership graph between them.
//!
//! A [`StateNode`] wraps one object or array. Every `set`/`delete` advances
//! the node's clock, stamps the node with the new revision and notifies its
//! listeners synchronously. When a node stores another node, it registers a
//! notifier on the child for that edge, so a write deep in the graph
//! re-stamps and re-notifies every ancestor on every path back to a root.
//!
//! # Ownership
//!
//! Storing an existing node never copies it: the same child may hang off
//! several parents (or several keys of one parent), each edge holding its
//! own notifier registration. An edge unregisters its notifier when it is
//! overwritten, deleted, or when the parent itself is dropped. The child
//! lives as long as any handle to it does.
//!
//! # Invariants
//!
//! 1. A node's revision strictly increases on every mutation that reaches it.
//! 2. A node ignores a fan-out revision it has already seen (or passed), so a
//!    child shared along several paths notifies each ancestor once.
//! 3. The graph is acyclic: storing a node that can reach the writer fails.
//! 4. All nodes of one graph share one clock.

use crate::pending::{Pending, Settled};
use crate::snapshot::{self, Snapshot, SnapshotCache};
use crate::subscription::{ListenerId, ListenerSet, Unsubscribe};
use crate::value::Value;
use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashSet;
use ripple_core::{
    Clock, ClockRef, Container, ContainerKind, Error, Key, Primitive, Result, Revision, Sequence,
};

/// Unique identifier for a state node.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// A parent→child edge. Dropping it unregisters the parent's notifier.
pub(crate) struct Edge {
    pub(crate) node: StateNode,
    parent: NodeId,
    listener: ListenerId,
}

impl Drop for Edge {
    fn drop(&mut self) {
        self.node.inner.listeners.remove(self.listener);
        tracing::trace!(
            parent = self.parent,
            child = self.node.id(),
            "detached child"
        );
    }
}

/// One entry of a node's raw container.
pub(crate) enum Slot {
    Primitive(Primitive),
    Child(Edge),
    /// `token` is the revision of the write that stored the computation.
    Pending { pending: Pending, token: Revision },
}

impl Slot {
    fn to_value(&self) -> Value {
        match self {
            Slot::Primitive(p) => Value::Primitive(p.clone()),
            Slot::Child(edge) => Value::State(edge.node.clone()),
            Slot::Pending { pending, .. } => Value::Pending(pending.clone()),
        }
    }
}

pub(crate) struct NodeState {
    pub(crate) container: Container<Slot>,
    pub(crate) revision: Revision,
}

pub(crate) struct NodeInner {
    id: NodeId,
    clock: ClockRef,
    state: RefCell<NodeState>,
    listeners: Rc<ListenerSet>,
    cache: RefCell<SnapshotCache>,
}

/// A value classified for storage, before any revision is minted.
enum Adopted {
    Primitive(Primitive),
    Node(StateNode),
    Pending(Pending),
}

/// A reactive container: one object or array whose mutations are versioned
/// and observable.
///
/// Cloning a `StateNode` creates a new handle to the **same** node.
///
/// # Example
///
/// ```
/// use ripple_reactive::{StateNode, Value};
///
/// let state = StateNode::new(Value::object([
///     ("a", Value::from(1)),
///     ("nested", Value::object([("b", 2)])),
/// ]))
/// .unwrap();
///
/// let before = state.snapshot();
/// state.child("nested").unwrap().set("b", 3).unwrap();
/// let after = state.snapshot();
///
/// assert!(!before.ptr_eq(&after));
/// assert_eq!(after.get_in(&["nested".into(), "b".into()]).unwrap().unwrap().as_i64(), Some(3));
/// ```
#[derive(Clone)]
pub struct StateNode {
    inner: Rc<NodeInner>,
}

impl StateNode {
    /// Creates a node on the process-wide clock.
    ///
    /// `initial` must be an object, an array, or an existing node (whose
    /// keys are copied; its children are shared, not copied). Every key is
    /// installed through `set`, in order.
    pub fn new(initial: impl Into<Value>) -> Result<Self> {
        Self::with_clock(initial, ClockRef::Global)
    }

    /// Creates a node bound to `clock`. Nodes created beneath it inherit it.
    pub fn with_clock(initial: impl Into<Value>, clock: ClockRef) -> Result<Self> {
        let (container, entries): (Container<Slot>, Vec<(Key, Value)>) = match initial.into() {
            Value::Object(entries) => (
                Container::empty(ContainerKind::Object),
                entries.into_iter().map(|(k, v)| (Key::Field(k), v)).collect(),
            ),
            Value::Array(items) => (
                Container::Array(Sequence::with_len(items.len())),
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (Key::Index(i), v))
                    .collect(),
            ),
            Value::Sparse { len, items } => (
                Container::Array(Sequence::with_len(len)),
                items.into_iter().map(|(i, v)| (Key::Index(i), v)).collect(),
            ),
            Value::State(node) => {
                let container = match node.kind() {
                    ContainerKind::Object => Container::empty(ContainerKind::Object),
                    ContainerKind::Array => Container::Array(Sequence::with_len(node.len())),
                };
                (container, node.entries())
            }
            other => return Err(Error::not_a_container(other.type_name())),
        };

        let kind = container.kind();
        let node = Self::empty(container, clock);
        tracing::trace!(node = node.id(), kind = %kind, keys = entries.len(), "state node created");
        for (key, value) in entries {
            node.set(key, value)?;
        }
        Ok(node)
    }

    fn empty(container: Container<Slot>, clock: ClockRef) -> Self {
        let revision = clock.current();
        Self {
            inner: Rc::new(NodeInner {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::SeqCst),
                clock,
                state: RefCell::new(NodeState {
                    container,
                    revision,
                }),
                listeners: Rc::new(ListenerSet::new()),
                cache: RefCell::new(SnapshotCache::default()),
            }),
        }
    }

    /// Returns the unique ID of this node.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Returns the revision at which this node (or anything beneath it)
    /// last changed.
    #[inline]
    pub fn revision(&self) -> Revision {
        self.inner.state.borrow().revision
    }

    /// Returns the clock this node is bound to.
    #[inline]
    pub fn clock(&self) -> &ClockRef {
        &self.inner.clock
    }

    /// Returns whether this node wraps an object or an array.
    pub fn kind(&self) -> ContainerKind {
        self.inner.state.borrow().container.kind()
    }

    /// Returns true if this node wraps an array.
    pub fn is_array(&self) -> bool {
        self.kind() == ContainerKind::Array
    }

    /// Returns the number of entries. For arrays this is the length, holes
    /// left by deletes included.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().container.len()
    }

    /// Returns true if the node has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.state.borrow().container.keys()
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.inner.state.borrow().container.contains_key(&key.into())
    }

    /// Returns the current raw value at `key`.
    ///
    /// Nested containers come back as the child node itself, so storing the
    /// result elsewhere shares the child.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.inner
            .state
            .borrow()
            .container
            .get(&key.into())
            .map(Slot::to_value)
    }

    /// Returns the child node at `key`, if the value there is a container.
    pub fn child(&self, key: impl Into<Key>) -> Option<StateNode> {
        match self.inner.state.borrow().container.get(&key.into()) {
            Some(Slot::Child(edge)) => Some(edge.node.clone()),
            _ => None,
        }
    }

    /// Returns every `(key, value)` pair in order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.inner
            .state
            .borrow()
            .container
            .iter()
            .map(|(k, slot)| (k, slot.to_value()))
            .collect()
    }

    /// Stores `value` at `key`, advances the revision and notifies.
    ///
    /// Containers are wrapped into new child nodes, existing nodes are
    /// shared, and pending computations are written back when they settle.
    /// Listeners fire even when the new value equals the old one.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Revision> {
        let key = key.into();
        self.inner.state.borrow().container.check_key(&key)?;

        let adopted = self.adopt(value.into())?;
        let revision = self.inner.clock.advance();
        let slot = self.attach(adopted, revision);

        let previous = {
            let mut state = self.inner.state.borrow_mut();
            let previous = state.container.insert(key.clone(), slot)?;
            state.revision = revision;
            previous
        };
        // Detaches a replaced child edge.
        drop(previous);

        tracing::trace!(node = self.id(), key = %key, revision = revision.get(), "set");
        self.inner.listeners.notify(revision);
        Ok(revision)
    }

    /// Removes `key`, advances the revision and notifies.
    ///
    /// Deleting an absent key still advances and notifies. Deleting an
    /// array index leaves a hole: the length and every other index stay
    /// as they were.
    pub fn delete(&self, key: impl Into<Key>) -> Result<Revision> {
        let key = key.into();
        self.inner.state.borrow().container.check_key(&key)?;

        let revision = self.inner.clock.advance();
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            let removed = state.container.remove(&key);
            state.revision = revision;
            removed
        };
        drop(removed);

        tracing::trace!(node = self.id(), key = %key, revision = revision.get(), "delete");
        self.inner.listeners.notify(revision);
        Ok(revision)
    }

    /// Appends `value` to an array node.
    pub fn push(&self, value: impl Into<Value>) -> Result<Revision> {
        let len = {
            let state = self.inner.state.borrow();
            if !state.container.is_array() {
                return Err(Error::invalid_operation("push on an object node"));
            }
            state.container.len()
        };
        self.set(Key::Index(len), value)
    }

    /// Registers `callback`, invoked with the new revision after every
    /// mutation reachable from this node.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(Revision) + 'static,
    {
        let id = self.inner.listeners.add(callback);
        Unsubscribe::new(&self.inner.listeners, id)
    }

    /// Returns the number of listeners, parent edges included.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Returns the immutable snapshot for the current revision.
    ///
    /// Two calls without an intervening mutation return the same snapshot.
    pub fn snapshot(&self) -> Snapshot {
        snapshot::take(self)
    }

    /// Returns true if both handles refer to the same node.
    #[inline]
    pub fn ptr_eq(&self, other: &StateNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn cache(&self) -> &RefCell<SnapshotCache> {
        &self.inner.cache
    }

    /// Runs `f` with shared access to the node's raw state.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&NodeState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    fn adopt(&self, value: Value) -> Result<Adopted> {
        match value {
            Value::Primitive(p) => Ok(Adopted::Primitive(p)),
            Value::Pending(pending) => self.adopt_pending(pending),
            Value::State(child) => {
                self.check_child(&child)?;
                Ok(Adopted::Node(child))
            }
            container @ (Value::Array(_) | Value::Sparse { .. } | Value::Object(_)) => {
                let child = StateNode::with_clock(container, self.inner.clock.clone())?;
                self.check_child(&child)?;
                Ok(Adopted::Node(child))
            }
        }
    }

    /// Unwraps computations that have already settled, following chains of
    /// computations resolved to other computations.
    fn adopt_pending(&self, mut pending: Pending) -> Result<Adopted> {
        let mut seen = Vec::new();
        loop {
            match pending.outcome() {
                None => return Ok(Adopted::Pending(pending)),
                Some(Err(rejection)) => {
                    tracing::warn!(node = self.id(), reason = %rejection.reason, "stored computation already rejected");
                    return Err(Error::rejected(rejection.reason));
                }
                Some(Ok(Value::Pending(next))) => {
                    seen.push(pending);
                    if seen.iter().any(|p| Pending::ptr_eq(p, &next)) {
                        tracing::debug!(node = self.id(), "rejected self-resolving computation");
                        return Err(Error::invalid_operation(
                            "pending computation resolves to itself",
                        ));
                    }
                    pending = next;
                }
                Some(Ok(resolved)) => return self.adopt(resolved),
            }
        }
    }

    fn check_child(&self, child: &StateNode) -> Result<()> {
        if !child.inner.clock.same(&self.inner.clock) {
            return Err(Error::clock_mismatch(child.id()));
        }
        if child.ptr_eq(self) || child.reaches(self) {
            tracing::debug!(parent = self.id(), child = child.id(), "rejected cyclic assignment");
            return Err(Error::cycle(child.id()));
        }
        Ok(())
    }

    /// Returns true if `target` is a descendant of this node.
    fn reaches(&self, target: &StateNode) -> bool {
        let mut stack = vec![self.clone()];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id()) {
                continue;
            }
            let state = node.inner.state.borrow();
            for slot in state.container.values() {
                if let Slot::Child(edge) = slot {
                    if edge.node.ptr_eq(target) {
                        return true;
                    }
                    stack.push(edge.node.clone());
                }
            }
        }
        false
    }

    fn attach(&self, adopted: Adopted, token: Revision) -> Slot {
        match adopted {
            Adopted::Primitive(p) => Slot::Primitive(p),
            Adopted::Node(child) => {
                let parent = Rc::downgrade(&self.inner);
                let listener = child.inner.listeners.add(move |revision| {
                    if let Some(inner) = parent.upgrade() {
                        StateNode { inner }.propagate(revision);
                    }
                });
                Slot::Child(Edge {
                    node: child,
                    parent: self.id(),
                    listener,
                })
            }
            Adopted::Pending(pending) => {
                let node = Rc::downgrade(&self.inner);
                pending.on_settle(Box::new(move |outcome| apply_settled(&node, token, outcome)));
                Slot::Pending { pending, token }
            }
        }
    }

    /// Takes a revision fanned out by a child.
    fn propagate(&self, revision: Revision) {
        {
            let mut state = self.inner.state.borrow_mut();
            if revision <= state.revision {
                return;
            }
            state.revision = revision;
        }
        self.inner.listeners.notify(revision);
    }

    /// Finds the key whose slot still holds the computation stored at `token`.
    fn pending_key(&self, token: Revision) -> Option<Key> {
        self.inner
            .state
            .borrow()
            .container
            .iter()
            .find(|(_, slot)| matches!(slot, Slot::Pending { token: t, .. } if *t == token))
            .map(|(key, _)| key)
    }
}

/// Writes a settled computation back into the node that stored it, unless
/// the slot has been overwritten since.
fn apply_settled(node: &Weak<NodeInner>, token: Revision, outcome: &Settled) -> Result<()> {
    let Some(inner) = node.upgrade() else {
        return Ok(());
    };
    let node = StateNode { inner };
    let Some(key) = node.pending_key(token) else {
        tracing::debug!(node = node.id(), token = token.get(), "ignoring stale pending resolution");
        return Ok(());
    };
    match outcome {
        Ok(value) => node.set(key, value.clone()).map(|_| ()),
        Err(rejection) => {
            tracing::warn!(node = node.id(), key = %key, reason = %rejection.reason, "pending computation rejected");
            Err(Error::rejected(rejection.reason.clone()))
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("StateNode");
        s.field("id", &self.inner.id);
        if let Ok(state) = self.inner.state.try_borrow() {
            s.field("kind", &state.container.kind())
                .field("len", &state.container.len())
                .field("revision", &state.revision);
        }
        s.field("listeners", &self.inner.listeners.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::pending;
    use alloc::string::String;
    use core::cell::Cell;
    use ripple_core::ManualClock;

    fn counter(node: &StateNode) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        node.subscribe(move |_| count_clone.set(count_clone.get() + 1));
        count
    }

    #[test]
    fn test_new_requires_container() {
        assert!(matches!(
            StateNode::new(5),
            Err(Error::NotAContainer { found: "int" })
        ));
        let (p, _r) = pending();
        assert!(StateNode::new(p).is_err());
        assert!(StateNode::new(Value::object([("a", 1)])).is_ok());
        assert!(StateNode::new(Value::array([1, 2])).unwrap().is_array());
    }

    #[test]
    fn test_initial_population_bumps_once_per_key() {
        let clock = ClockRef::shared(ManualClock::new());
        let node = StateNode::with_clock(
            Value::object([("a", 1), ("b", 2), ("c", 3)]),
            clock.clone(),
        )
        .unwrap();

        assert_eq!(node.revision(), Revision::new(3));
        assert_eq!(clock.current(), Revision::new(3));
        assert_eq!(
            node.keys(),
            vec![Key::from("a"), Key::from("b"), Key::from("c")]
        );
    }

    #[test]
    fn test_set_and_get() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        node.set("b", "two").unwrap();

        assert_eq!(node.get("a").unwrap().as_i64(), Some(1));
        assert_eq!(node.get("b").unwrap().as_str(), Some("two"));
        assert!(node.get("missing").is_none());
        assert_eq!(node.len(), 2);
    }

    #[test]
    fn test_set_wraps_containers() {
        let node = StateNode::new(Value::object([("nested", Value::object([("b", 2)]))])).unwrap();
        let nested = node.child("nested").unwrap();

        assert_eq!(nested.get("b").unwrap().as_i64(), Some(2));
        assert_eq!(nested.listener_count(), 1);
        assert!(node.child("missing").is_none());
    }

    #[test]
    fn test_set_notifies_even_when_value_is_equal() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let count = counter(&node);

        let r1 = node.set("a", 1).unwrap();
        let r2 = node.set("a", 1).unwrap();

        assert_eq!(count.get(), 2);
        assert!(r2 > r1);
    }

    #[test]
    fn test_revision_fans_out_to_ancestors() {
        let root = StateNode::new(Value::object([(
            "x",
            Value::object([("y", Value::object([("z", 0)]))]),
        )]))
        .unwrap();
        let x = root.child("x").unwrap();
        let y = x.child("y").unwrap();

        let revision = y.set("z", 1).unwrap();

        assert_eq!(y.revision(), revision);
        assert_eq!(x.revision(), revision);
        assert_eq!(root.revision(), revision);
    }

    #[test]
    fn test_shared_child_notifies_every_parent() {
        let shared = StateNode::new(Value::object([("v", 0)])).unwrap();
        let a = StateNode::new(Value::object([("c", &shared)])).unwrap();
        let b = StateNode::new(Value::object([("c", &shared)])).unwrap();
        let a_count = counter(&a);
        let b_count = counter(&b);

        assert!(a.child("c").unwrap().ptr_eq(&shared));
        assert_eq!(shared.listener_count(), 2);

        shared.set("v", 1).unwrap();
        assert_eq!(a_count.get(), 1);
        assert_eq!(b_count.get(), 1);
    }

    #[test]
    fn test_diamond_notifies_root_once() {
        let leaf = StateNode::new(Value::object([("v", 0)])).unwrap();
        let root = StateNode::new(Value::object([
            ("left", Value::object([("leaf", &leaf)])),
            ("right", Value::object([("leaf", &leaf)])),
        ]))
        .unwrap();
        let count = counter(&root);

        let revision = leaf.set("v", 1).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(root.revision(), revision);
    }

    #[test]
    fn test_overwrite_detaches_only_that_edge() {
        let shared = StateNode::new(Value::object([("v", 0)])).unwrap();
        let x = StateNode::new(Value::object([("k", &shared)])).unwrap();
        let y = StateNode::new(Value::object([("k", &shared)])).unwrap();
        let x_count = counter(&x);
        let y_count = counter(&y);

        x.set("k", 5).unwrap();
        assert_eq!(x_count.get(), 1);
        assert_eq!(shared.listener_count(), 1);

        shared.set("v", 1).unwrap();
        assert_eq!(x_count.get(), 1);
        assert_eq!(y_count.get(), 1);
    }

    #[test]
    fn test_same_child_under_two_keys() {
        let shared = StateNode::new(Value::object([("v", 0)])).unwrap();
        let parent = StateNode::new(Value::object([("a", &shared), ("b", &shared)])).unwrap();
        let count = counter(&parent);
        assert_eq!(shared.listener_count(), 2);

        parent.delete("a").unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(shared.listener_count(), 1);

        // Still reachable through "b".
        shared.set("v", 1).unwrap();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_delete_detaches_and_notifies() {
        let node = StateNode::new(Value::object([("child", Value::object([("v", 0)]))])).unwrap();
        let child = node.child("child").unwrap();
        let count = counter(&node);

        node.delete("child").unwrap();
        assert_eq!(count.get(), 1);
        assert!(!node.contains_key("child"));
        assert_eq!(child.listener_count(), 0);

        child.set("v", 1).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_delete_absent_key_still_notifies() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let count = counter(&node);
        let before = node.revision();

        let revision = node.delete("nope").unwrap();
        assert_eq!(count.get(), 1);
        assert!(revision > before);
    }

    #[test]
    fn test_key_kind_mismatch() {
        let obj = StateNode::new(Value::object([("a", 1)])).unwrap();
        let arr = StateNode::new(Value::array([1])).unwrap();
        let before = obj.revision();

        assert!(matches!(obj.set(0usize, 1), Err(Error::InvalidKey { .. })));
        assert!(matches!(arr.set("a", 1), Err(Error::InvalidKey { .. })));
        assert!(arr.delete("a").is_err());
        assert_eq!(obj.revision(), before);
    }

    #[test]
    fn test_array_delete_leaves_hole() {
        let arr = StateNode::new(Value::array([10, 20, 30])).unwrap();
        arr.delete(0usize).unwrap();

        assert!(!arr.contains_key(0usize));
        assert!(arr.get(0usize).is_none());
        assert_eq!(arr.get(1usize).unwrap().as_i64(), Some(20));
        assert_eq!(arr.get(2usize).unwrap().as_i64(), Some(30));
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.keys(), vec![Key::Index(1), Key::Index(2)]);

        arr.push(40).unwrap();
        assert_eq!(arr.get(3usize).unwrap().as_i64(), Some(40));
        assert_eq!(arr.len(), 4);

        let obj = StateNode::new(Value::object([("a", 1)])).unwrap();
        assert!(matches!(obj.push(1), Err(Error::InvalidOperation { .. })));
    }

    #[test]
    fn test_array_write_past_end_is_sparse() {
        let arr = StateNode::new(Value::array([1])).unwrap();
        arr.set(4usize, 5).unwrap();
        assert_eq!(arr.len(), 5);
        assert!(!arr.contains_key(2usize));

        arr.set(1usize << 30, 6).unwrap();
        assert_eq!(arr.len(), (1usize << 30) + 1);
        assert_eq!(arr.entries().len(), 3);
    }

    #[test]
    fn test_array_index_out_of_range() {
        let arr = StateNode::new(Value::array([1])).unwrap();
        let count = counter(&arr);
        let before = arr.revision();

        assert!(matches!(arr.set(usize::MAX, 1), Err(Error::InvalidKey { .. })));
        assert!(matches!(arr.set(1usize << 40, 1), Err(Error::InvalidKey { .. })));
        assert!(matches!(arr.delete(usize::MAX), Err(Error::InvalidKey { .. })));
        assert_eq!(arr.revision(), before);
        assert_eq!(arr.len(), 1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_copy_keeps_holes() {
        let source = StateNode::new(Value::array([1, 2, 3])).unwrap();
        source.delete(1usize).unwrap();

        let copy = StateNode::new(&source).unwrap();
        assert_eq!(copy.len(), 3);
        assert!(!copy.contains_key(1usize));
        assert_eq!(copy.get(2usize).unwrap().as_i64(), Some(3));

        let from_snapshot = StateNode::new(&source.snapshot()).unwrap();
        assert_eq!(from_snapshot.len(), 3);
        assert!(!from_snapshot.contains_key(1usize));
    }

    #[test]
    fn test_cycle_rejected() {
        let a = StateNode::new(Value::object([("b", Value::object([("v", 0)]))])).unwrap();
        let b = a.child("b").unwrap();

        assert!(matches!(a.set("self", &a), Err(Error::Cycle { .. })));
        assert!(matches!(b.set("up", &a), Err(Error::Cycle { .. })));
        assert!(matches!(
            b.set("wrapped", Value::object([("up", &a)])),
            Err(Error::Cycle { .. })
        ));
        assert!(!b.contains_key("up"));
    }

    #[test]
    fn test_clock_mismatch_rejected() {
        let local = StateNode::with_clock(
            Value::object([("v", 0)]),
            ClockRef::shared(ManualClock::new()),
        )
        .unwrap();
        let global = StateNode::new(Value::object([("a", 1)])).unwrap();

        assert!(matches!(
            global.set("local", &local),
            Err(Error::ClockMismatch { .. })
        ));
    }

    #[test]
    fn test_children_inherit_clock() {
        let clock = ClockRef::shared(ManualClock::new());
        let node = StateNode::with_clock(Value::object([("n", Value::array([1]))]), clock.clone())
            .unwrap();
        assert!(node.child("n").unwrap().clock().same(&clock));
    }

    #[test]
    fn test_new_from_existing_node_shares_children() {
        let source = StateNode::new(Value::object([("a", Value::from(1)), ("c", Value::object([("v", 0)]))]))
            .unwrap();
        let copy = StateNode::new(&source).unwrap();

        assert!(!copy.ptr_eq(&source));
        assert!(copy.child("c").unwrap().ptr_eq(&source.child("c").unwrap()));

        copy.set("a", 2).unwrap();
        assert_eq!(source.get("a").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_dropping_parent_detaches_from_child() {
        let child = StateNode::new(Value::object([("v", 0)])).unwrap();
        {
            let _parent = StateNode::new(Value::object([("c", &child)])).unwrap();
            assert_eq!(child.listener_count(), 1);
        }
        assert_eq!(child.listener_count(), 0);
    }

    #[test]
    fn test_pending_resolution_writes_back() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let (p, r) = pending();
        node.set("data", p).unwrap();
        assert!(node.get("data").unwrap().as_pending().is_some());

        let count = counter(&node);
        r.resolve(Value::object([("x", 1)])).unwrap();

        assert_eq!(count.get(), 1);
        assert_eq!(node.child("data").unwrap().get("x").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_stale_pending_resolution_ignored() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let (p, r) = pending();
        node.set("data", p).unwrap();
        node.set("data", "newer").unwrap();

        let count = counter(&node);
        r.resolve("stale").unwrap();

        assert_eq!(count.get(), 0);
        assert_eq!(node.get("data").unwrap().as_str(), Some("newer"));
    }

    #[test]
    fn test_pending_keeps_its_index_after_delete() {
        let arr = StateNode::new(Value::array([0])).unwrap();
        let (p, r) = pending();
        arr.push(p).unwrap();
        arr.delete(0usize).unwrap();

        r.resolve(7).unwrap();
        assert_eq!(arr.get(1usize).unwrap().as_i64(), Some(7));
        assert!(!arr.contains_key(0usize));
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn test_pending_resolved_with_itself() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let (p, r) = pending();
        node.set("a", p.clone()).unwrap();

        let err = r.resolve(p).unwrap_err();
        assert!(
            matches!(err, Error::Rejected { ref reason } if reason == "computation resolved to itself")
        );
        assert!(node.get("a").unwrap().as_pending().unwrap().is_settled());
    }

    #[test]
    fn test_pending_resolution_cycle_rejected() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let (pa, ra) = pending();
        let (pb, rb) = pending();
        ra.resolve(pb.clone()).unwrap();
        rb.resolve(pa.clone()).unwrap();
        let before = node.revision();

        assert!(matches!(
            node.set("x", pa),
            Err(Error::InvalidOperation { .. })
        ));
        assert!(!node.contains_key("x"));
        assert_eq!(node.revision(), before);

        node.set("y", Pending::resolved(Pending::resolved(4))).unwrap();
        assert_eq!(node.get("y").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_pending_rejection_surfaces() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        let (p, r) = pending();
        node.set("data", p).unwrap();

        let err = r.reject("offline").unwrap_err();
        assert!(matches!(err, Error::Rejected { ref reason } if reason == "offline"));
        assert!(node.get("data").unwrap().as_pending().unwrap().is_settled());
    }

    #[test]
    fn test_already_settled_pending() {
        let node = StateNode::new(Value::object([("a", 1)])).unwrap();
        node.set("ready", Pending::resolved(3)).unwrap();
        assert_eq!(node.get("ready").unwrap().as_i64(), Some(3));

        let before = node.revision();
        assert!(matches!(
            node.set("failed", Pending::rejected("bad")),
            Err(Error::Rejected { .. })
        ));
        assert!(!node.contains_key("failed"));
        assert_eq!(node.revision(), before);
    }

    #[test]
    fn test_reentrant_write_from_listener() {
        let node = StateNode::new(Value::object([("a", 0), ("b", 0)])).unwrap();
        let writer = node.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        node.subscribe(move |revision| {
            seen_clone.borrow_mut().push(revision);
            if writer.get("b").and_then(|v| v.as_i64()) == Some(0) {
                writer.set("b", 1).unwrap();
            }
        });

        node.set("a", 1).unwrap();
        assert_eq!(node.get("b").unwrap().as_i64(), Some(1));
        assert_eq!(seen.borrow().len(), 2);
        assert!(seen.borrow()[1] > seen.borrow()[0]);
    }

    #[test]
    fn test_unsubscribe() {
        let node = StateNode::new(Value::object([("a", 0)])).unwrap();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let handle = node.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        node.set("a", 1).unwrap();
        assert!(handle.unsubscribe());
        node.set("a", 2).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_entries_round_trip_shares_children() {
        let node = StateNode::new(Value::object([
            ("name", Value::from(String::from("ripple"))),
            ("tags", Value::array(["a", "b"])),
        ]))
        .unwrap();

        let entries = node.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].1.as_state().unwrap().ptr_eq(&node.child("tags").unwrap()));
    }
}
