//! Immutable snapshots of state nodes.
//!
//! A [`Snapshot`] is a deep, read-only view of a node at one revision.
//! Snapshots are cached per node: asking again at the same revision hands
//! back the very same snapshot, and an unchanged subtree inside a newer
//! snapshot is the very same sub-snapshot as before. Identity comparison
//! with [`Snapshot::ptr_eq`] is therefore a valid "nothing changed here"
//! test.

use crate::node::{NodeId, Slot, StateNode};
use crate::pending::Pending;
use crate::value::Value;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use ripple_core::{Container, Key, Primitive, Revision};
use thiserror::Error;

/// Unique identifier for a built snapshot.
pub type SnapshotId = u64;

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// Signal raised when a read reaches a computation that has not settled.
///
/// The caller may await [`Suspended::pending`] and retry the read.
#[derive(Clone, Debug, Error)]
#[error("value is pending computation {}", .pending.id())]
pub struct Suspended {
    pending: Pending,
}

impl Suspended {
    /// Returns the computation the read is waiting on.
    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    /// Consumes the signal, returning the computation.
    pub fn into_pending(self) -> Pending {
        self.pending
    }
}

/// A readable snapshot field.
#[derive(Clone, Debug)]
pub enum SnapshotValue {
    Primitive(Primitive),
    Snapshot(Snapshot),
}

impl SnapshotValue {
    /// Returns the primitive if this is one.
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            SnapshotValue::Primitive(p) => Some(p),
            SnapshotValue::Snapshot(_) => None,
        }
    }

    /// Returns the sub-snapshot if this is one.
    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match self {
            SnapshotValue::Snapshot(s) => Some(s),
            SnapshotValue::Primitive(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive().and_then(Primitive::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }

    /// Deep-copies the value into a plain [`Value`].
    pub fn to_value(&self) -> Value {
        match self {
            SnapshotValue::Primitive(p) => Value::Primitive(p.clone()),
            SnapshotValue::Snapshot(s) => s.to_value(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Field {
    Ready(SnapshotValue),
    Pending(Pending),
}

struct SnapshotInner {
    id: SnapshotId,
    node: NodeId,
    revision: Revision,
    fields: Container<Field>,
}

/// A deep immutable view of a state node at one revision.
///
/// Cloning is cheap and preserves identity.
#[derive(Clone)]
pub struct Snapshot {
    inner: Rc<SnapshotInner>,
}

impl Snapshot {
    /// Returns the unique ID of this snapshot.
    #[inline]
    pub fn id(&self) -> SnapshotId {
        self.inner.id
    }

    /// Returns the ID of the node this snapshot was taken from.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    /// Returns the node revision this snapshot reflects.
    #[inline]
    pub fn revision(&self) -> Revision {
        self.inner.revision
    }

    /// Returns true if both handles refer to the same snapshot.
    #[inline]
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_array(&self) -> bool {
        self.inner.fields.is_array()
    }

    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }

    /// Returns the keys in order.
    pub fn keys(&self) -> Vec<Key> {
        self.inner.fields.keys()
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.inner.fields.contains_key(key)
    }

    /// Reads the field at `key`.
    ///
    /// Returns `Ok(None)` for an absent key and `Err(Suspended)` when the
    /// field holds a computation that had not settled when the node was
    /// last written.
    pub fn get(&self, key: &Key) -> Result<Option<&SnapshotValue>, Suspended> {
        match self.inner.fields.get(key) {
            None => Ok(None),
            Some(Field::Ready(value)) => Ok(Some(value)),
            Some(Field::Pending(pending)) => Err(Suspended {
                pending: pending.clone(),
            }),
        }
    }

    /// Follows `path` through nested snapshots.
    ///
    /// An empty path is not meaningful and reads as absent.
    pub fn get_in(&self, path: &[Key]) -> Result<Option<&SnapshotValue>, Suspended> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(None);
        };
        let mut current = self;
        for key in parents {
            match current.get(key)? {
                Some(SnapshotValue::Snapshot(next)) => current = next,
                _ => return Ok(None),
            }
        }
        current.get(last)
    }

    /// Deep-copies the snapshot into a plain [`Value`].
    ///
    /// Unsettled fields come back as [`Value::Pending`]. Arrays with holes
    /// come back as [`Value::Sparse`] of the same length.
    pub fn to_value(&self) -> Value {
        let fields = &self.inner.fields;
        let convert = |field: &Field| match field {
            Field::Ready(value) => value.to_value(),
            Field::Pending(pending) => Value::Pending(pending.clone()),
        };
        if fields.is_array() {
            let items: Vec<(usize, Value)> = fields
                .iter()
                .filter_map(|(key, field)| key.as_index().map(|i| (i, convert(field))))
                .collect();
            if items.len() == fields.len() {
                Value::Array(items.into_iter().map(|(_, v)| v).collect())
            } else {
                Value::Sparse {
                    len: fields.len(),
                    items,
                }
            }
        } else {
            Value::Object(
                fields
                    .iter()
                    .filter_map(|(key, field)| key.as_field().map(|k| (k.into(), convert(field))))
                    .collect(),
            )
        }
    }

    pub(crate) fn field(&self, key: &Key) -> Option<&Field> {
        self.inner.fields.get(key)
    }
}

impl From<&Snapshot> for Value {
    fn from(snapshot: &Snapshot) -> Self {
        snapshot.to_value()
    }
}

impl From<Snapshot> for Value {
    fn from(snapshot: Snapshot) -> Self {
        snapshot.to_value()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.inner.id)
            .field("node", &self.inner.node)
            .field("revision", &self.inner.revision)
            .field("fields", &self.inner.fields)
            .finish()
    }
}

/// The latest snapshot built for one node.
#[derive(Default)]
pub(crate) struct SnapshotCache {
    latest: Option<Snapshot>,
}

impl SnapshotCache {
    fn get(&self, revision: Revision) -> Option<Snapshot> {
        self.latest
            .as_ref()
            .filter(|s| s.revision() == revision)
            .cloned()
    }

    fn store(&mut self, snapshot: Snapshot) {
        self.latest = Some(snapshot);
    }
}

/// Returns the snapshot of `node` at its current revision, building it (and
/// any stale sub-snapshots) if the cached one is out of date.
pub(crate) fn take(node: &StateNode) -> Snapshot {
    let revision = node.revision();
    if let Some(hit) = node.cache().borrow().get(revision) {
        return hit;
    }

    let fields = node.with_state(|state| {
        state.container.map(|slot| match slot {
            Slot::Primitive(p) => Field::Ready(SnapshotValue::Primitive(p.clone())),
            Slot::Child(edge) => Field::Ready(SnapshotValue::Snapshot(take(&edge.node))),
            Slot::Pending { pending, .. } => Field::Pending(pending.clone()),
        })
    });
    let snapshot = Snapshot {
        inner: Rc::new(SnapshotInner {
            id: NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::SeqCst),
            node: node.id(),
            revision,
            fields,
        }),
    };
    tracing::trace!(
        node = node.id(),
        snapshot = snapshot.id(),
        revision = revision.get(),
        "snapshot rebuilt"
    );

    node.cache().borrow_mut().store(snapshot.clone());
    snapshot
}
