//! Selective change detection.
//!
//! [`has_changed`] decides whether a consumer that read `prev` through a
//! tracked view must recompute now that `next` is available. Only the keys
//! recorded in the [`Affected`] record are compared; unchanged subtrees
//! short-circuit on snapshot identity.

use crate::snapshot::{Field, Snapshot, SnapshotId, SnapshotValue};
use crate::tracking::{Affected, Used};
use hashbrown::HashMap;

/// Memoizes comparison results across calls that share one [`Affected`]
/// record.
///
/// Results depend on the record: clear the cache whenever the record
/// changes.
#[derive(Debug, Default)]
pub struct ChangeCache {
    memo: HashMap<(SnapshotId, SnapshotId), bool>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of memoized pairs.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }
}

/// Returns true if any path recorded against `prev` reads differently in
/// `next`.
///
/// - identical snapshots never changed;
/// - a snapshot with no recorded reads is compared by identity only;
/// - an enumerated key list (or length) must match exactly;
/// - primitives compare by value and sub-snapshots recurse;
/// - a pending field on either side counts as changed.
///
/// A consumer that recorded no reads against `prev` is treated as depending
/// on the whole snapshot, so any new identity counts as a change.
pub fn has_changed(prev: &Snapshot, next: &Snapshot, affected: &Affected) -> bool {
    Detector {
        affected,
        cache: None,
    }
    .changed(prev, next)
}

/// Like [`has_changed`], memoizing every compared pair in `cache`.
pub fn has_changed_with(
    prev: &Snapshot,
    next: &Snapshot,
    affected: &Affected,
    cache: &mut ChangeCache,
) -> bool {
    Detector {
        affected,
        cache: Some(cache),
    }
    .changed(prev, next)
}

struct Detector<'a> {
    affected: &'a Affected,
    cache: Option<&'a mut ChangeCache>,
}

impl Detector<'_> {
    fn changed(&mut self, prev: &Snapshot, next: &Snapshot) -> bool {
        if prev.ptr_eq(next) {
            return false;
        }
        let affected = self.affected;
        let Some(used) = affected.lookup(prev.id()) else {
            return true;
        };

        let pair = (prev.id(), next.id());
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.memo.get(&pair)) {
            return *hit;
        }
        let result = self.compare(&used, prev, next);
        if let Some(cache) = self.cache.as_mut() {
            cache.memo.insert(pair, result);
        }
        result
    }

    fn compare(&mut self, used: &Used, prev: &Snapshot, next: &Snapshot) -> bool {
        if used.own_keys && (prev.len() != next.len() || prev.keys() != next.keys()) {
            return true;
        }
        used.keys.iter().any(|key| match (prev.field(key), next.field(key)) {
            (None, None) => false,
            (Some(Field::Ready(a)), Some(Field::Ready(b))) => match (a, b) {
                (SnapshotValue::Primitive(x), SnapshotValue::Primitive(y)) => x != y,
                (SnapshotValue::Snapshot(x), SnapshotValue::Snapshot(y)) => self.changed(x, y),
                _ => true,
            },
            // Pending on either side, or present on one side only.
            _ => true,
        })
    }
}
