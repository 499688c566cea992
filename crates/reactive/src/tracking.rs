//! Read tracking over snapshots.
//!
//! A consumer wraps a snapshot with [`wrap_with_path_tracking`] and reads
//! through the returned [`Tracked`] view. Every key it touches, in every
//! sub-snapshot it descends into, is written to an [`Affected`] record. The
//! record later tells the change detector which parts of a newer snapshot
//! are worth comparing.

use crate::snapshot::{Snapshot, SnapshotId, SnapshotValue, Suspended};
use crate::value::Value;
use alloc::vec::Vec;
use core::cell::{Ref, RefCell};
use core::fmt;
use hashbrown::{HashMap, HashSet};
use ripple_core::{Key, Path, Primitive};

/// Reads recorded against one snapshot.
#[derive(Debug, Default)]
pub(crate) struct Used {
    /// Keys read, in first-read order.
    pub(crate) keys: Vec<Key>,
    seen: HashSet<Key>,
    /// True if the key list itself was enumerated.
    pub(crate) own_keys: bool,
}

/// The set of paths a consumer read, per visited snapshot.
///
/// Recording goes through a shared reference, so many [`Tracked`] views
/// can feed one record. A record is meant to live for one consumption
/// cycle; start over with [`Affected::clear`] or a fresh record.
#[derive(Default)]
pub struct Affected {
    used: RefCell<HashMap<SnapshotId, Used>>,
}

impl Affected {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing has been read.
    pub fn is_empty(&self) -> bool {
        self.used.borrow().is_empty()
    }

    /// Returns the number of snapshots with recorded reads.
    pub fn len(&self) -> usize {
        self.used.borrow().len()
    }

    /// Forgets every recorded read.
    pub fn clear(&self) {
        self.used.borrow_mut().clear();
    }

    /// Returns the keys read from `snapshot`, in first-read order.
    pub fn keys_read(&self, snapshot: &Snapshot) -> Option<Vec<Key>> {
        self.used
            .borrow()
            .get(&snapshot.id())
            .map(|used| used.keys.clone())
    }

    /// Returns true if the key list of `snapshot` was enumerated.
    pub fn enumerated(&self, snapshot: &Snapshot) -> bool {
        self.used
            .borrow()
            .get(&snapshot.id())
            .is_some_and(|used| used.own_keys)
    }

    /// Reconstructs every key path read, starting at `root`.
    ///
    /// Reading `a.b` yields both `[a]` and `[a, b]`. A sub-snapshot reached
    /// through several keys is listed under each of them.
    pub fn paths(&self, root: &Snapshot) -> Vec<Path> {
        let mut out = Vec::new();
        let mut prefix = Path::new();
        self.collect_paths(root, &mut prefix, &mut out);
        out
    }

    fn collect_paths(&self, snapshot: &Snapshot, prefix: &mut Path, out: &mut Vec<Path>) {
        let Some(keys) = self.keys_read(snapshot) else {
            return;
        };
        for key in keys {
            prefix.push(key.clone());
            out.push(prefix.clone());
            if let Ok(Some(SnapshotValue::Snapshot(child))) = snapshot.get(&key) {
                self.collect_paths(child, prefix, out);
            }
            prefix.pop();
        }
    }

    pub(crate) fn record_key(&self, snapshot: SnapshotId, key: &Key) {
        let mut used = self.used.borrow_mut();
        let entry = used.entry(snapshot).or_default();
        if entry.seen.insert(key.clone()) {
            entry.keys.push(key.clone());
        }
    }

    pub(crate) fn record_own_keys(&self, snapshot: SnapshotId) {
        self.used.borrow_mut().entry(snapshot).or_default().own_keys = true;
    }

    pub(crate) fn lookup(&self, snapshot: SnapshotId) -> Option<Ref<'_, Used>> {
        Ref::filter_map(self.used.borrow(), |used| used.get(&snapshot)).ok()
    }
}

impl fmt::Debug for Affected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Affected")
            .field("snapshots", &self.len())
            .finish()
    }
}

/// A snapshot view that records every read into an [`Affected`] record.
#[derive(Clone, Debug)]
pub struct Tracked<'a> {
    snapshot: Snapshot,
    affected: &'a Affected,
}

/// A value read through a [`Tracked`] view.
#[derive(Clone, Debug)]
pub enum TrackedValue<'a> {
    Primitive(Primitive),
    Tracked(Tracked<'a>),
}

impl<'a> TrackedValue<'a> {
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            TrackedValue::Primitive(p) => Some(p),
            TrackedValue::Tracked(_) => None,
        }
    }

    pub fn as_tracked(&self) -> Option<&Tracked<'a>> {
        match self {
            TrackedValue::Tracked(t) => Some(t),
            TrackedValue::Primitive(_) => None,
        }
    }

    pub fn into_tracked(self) -> Option<Tracked<'a>> {
        match self {
            TrackedValue::Tracked(t) => Some(t),
            TrackedValue::Primitive(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive().and_then(Primitive::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }
}

impl<'a> Tracked<'a> {
    /// Reads `key`, recording it first (so a read that suspends still
    /// counts as a read).
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<TrackedValue<'a>>, Suspended> {
        let key = key.into();
        self.affected.record_key(self.snapshot.id(), &key);
        Ok(self.snapshot.get(&key)?.map(|value| match value {
            SnapshotValue::Primitive(p) => TrackedValue::Primitive(p.clone()),
            SnapshotValue::Snapshot(s) => TrackedValue::Tracked(Tracked {
                snapshot: s.clone(),
                affected: self.affected,
            }),
        }))
    }

    /// Follows `path`, recording every step.
    pub fn get_in(&self, path: &[Key]) -> Result<Option<TrackedValue<'a>>, Suspended> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(None);
        };
        let mut current = self.clone();
        for key in parents {
            match current.get(key)? {
                Some(TrackedValue::Tracked(next)) => current = next,
                _ => return Ok(None),
            }
        }
        current.get(last)
    }

    /// Returns true if `key` is present. Recorded as a read of `key`.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        self.affected.record_key(self.snapshot.id(), &key);
        self.snapshot.contains_key(&key)
    }

    /// Enumerates the keys. Recorded as a read of the key list.
    pub fn keys(&self) -> Vec<Key> {
        self.affected.record_own_keys(self.snapshot.id());
        self.snapshot.keys()
    }

    /// Returns the number of entries. Recorded as a read of the key list.
    pub fn len(&self) -> usize {
        self.affected.record_own_keys(self.snapshot.id());
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        self.snapshot.is_array()
    }

    /// Returns the underlying snapshot without recording anything.
    pub fn untracked(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn into_untracked(self) -> Snapshot {
        self.snapshot
    }

    /// Returns the record this view writes into.
    pub fn affected(&self) -> &'a Affected {
        self.affected
    }
}

impl From<&Tracked<'_>> for Value {
    fn from(tracked: &Tracked<'_>) -> Self {
        tracked.snapshot.to_value()
    }
}

impl From<Tracked<'_>> for Value {
    fn from(tracked: Tracked<'_>) -> Self {
        tracked.snapshot.to_value()
    }
}

/// Wraps `snapshot` so that every read through it is recorded in `affected`.
pub fn wrap_with_path_tracking<'a>(snapshot: &Snapshot, affected: &'a Affected) -> Tracked<'a> {
    Tracked {
        snapshot: snapshot.clone(),
        affected,
    }
}
