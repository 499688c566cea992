//! Raw container shapes shared by state nodes and snapshots.
//!
//! A `Container` is either an insertion-ordered object (`OrderedMap`) or a
//! sparse positional sequence (`Sequence`). Both state nodes (holding live
//! slots) and snapshots (holding frozen fields) use the same shape, so key
//! handling lives here.

use crate::error::{Error, Result};
use crate::key::Key;
use alloc::collections::btree_map::{self, BTreeMap};
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;

/// An object with unique keys that preserves insertion order.
///
/// Entries are kept in a vector for ordered iteration, with a hash index
/// for O(1) lookup. Removal shifts later entries and repairs the index.
#[derive(Clone, Debug)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OrderedMap<V> {
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Creates a map with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets a value by key.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    /// Returns true if the map contains the given key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts a value, returning the previous one.
    ///
    /// Replacing an existing key keeps its original position.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        match self.index.get(&key) {
            Some(&idx) => Some(core::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Removes a key and returns its value if present.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        let (_, value) = self.entries.remove(idx);
        for (k, _) in &self.entries[idx..] {
            if let Some(pos) = self.index.get_mut(k.as_str()) {
                *pos -= 1;
            }
        }
        Some(value)
    }

    /// Returns an iterator over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Returns an iterator over the values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Returns an iterator over key-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V: PartialEq> PartialEq for OrderedMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Exclusive upper bound on sequence indices (and so on sequence length).
pub const MAX_SEQUENCE_LEN: usize = u32::MAX as usize;

/// A positional sequence that may contain holes.
///
/// The length is one past the highest index ever written, or the length it
/// was created with. Removing an element leaves a hole and keeps the length
/// and every other index unchanged. Only present elements are stored, so a
/// write far past the end costs one entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence<V> {
    items: BTreeMap<usize, V>,
    len: usize,
}

impl<V> Default for Sequence<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Sequence<V> {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::with_len(0)
    }

    /// Creates a sequence of `len` holes.
    pub fn with_len(len: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            len: len.min(MAX_SEQUENCE_LEN),
        }
    }

    /// Returns the length, holes included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of present elements.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.items.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.items.contains_key(&index)
    }

    /// Stores `value` at `index`, growing the length past it if needed.
    ///
    /// Indices at or beyond `MAX_SEQUENCE_LEN` are rejected.
    pub fn insert(&mut self, index: usize, value: V) -> Result<Option<V>> {
        if index >= MAX_SEQUENCE_LEN {
            return Err(Error::invalid_key(Key::Index(index), ContainerKind::Array));
        }
        self.len = self.len.max(index + 1);
        Ok(self.items.insert(index, value))
    }

    /// Appends `value` at the current length.
    pub fn push(&mut self, value: V) -> Result<()> {
        self.insert(self.len, value).map(|_| ())
    }

    /// Removes the element at `index`, leaving a hole.
    pub fn remove(&mut self, index: usize) -> Option<V> {
        self.items.remove(&index)
    }

    /// Returns `(index, value)` pairs of present elements in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> {
        self.items.iter().map(|(i, v)| (*i, v))
    }

    fn map<U>(&self, mut f: impl FnMut(&V) -> U) -> Sequence<U> {
        Sequence {
            items: self.items.iter().map(|(i, v)| (*i, f(v))).collect(),
            len: self.len,
        }
    }
}

impl<V> FromIterator<V> for Sequence<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let items: BTreeMap<usize, V> = iter.into_iter().enumerate().collect();
        let len = items.len();
        Self { items, len }
    }
}

/// The shape of a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Keyed object
    Object,
    /// Positional sequence
    Array,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Object => f.write_str("object"),
            ContainerKind::Array => f.write_str("array"),
        }
    }
}

/// An object or a sequence of `V`.
#[derive(Clone, Debug, PartialEq)]
pub enum Container<V> {
    /// Keyed object
    Object(OrderedMap<V>),
    /// Positional sequence
    Array(Sequence<V>),
}

impl<V> Container<V> {
    /// Creates an empty container of the given kind.
    pub fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Object => Container::Object(OrderedMap::new()),
            ContainerKind::Array => Container::Array(Sequence::new()),
        }
    }

    /// Returns the shape of this container.
    #[inline]
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::Object(_) => ContainerKind::Object,
            Container::Array(_) => ContainerKind::Array,
        }
    }

    /// Returns true if this is a sequence.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Container::Array(_))
    }

    /// Returns the number of entries. For sequences this is the length,
    /// holes included.
    pub fn len(&self) -> usize {
        match self {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    /// Returns true if the container has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that `key` is the right kind of key for this container and,
    /// for sequences, that the index is in range.
    pub fn check_key(&self, key: &Key) -> Result<()> {
        match (self, key) {
            (Container::Object(_), Key::Field(_)) => Ok(()),
            (Container::Array(_), Key::Index(i)) if *i < MAX_SEQUENCE_LEN => Ok(()),
            _ => Err(Error::invalid_key(key.clone(), self.kind())),
        }
    }

    /// Gets the value at `key`. Holes and keys of the wrong kind find nothing.
    pub fn get(&self, key: &Key) -> Option<&V> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.get(name),
            (Container::Array(items), Key::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Stores `value` at `key`, returning the value it replaced.
    ///
    /// Writing a sequence at or past its length extends the length; any
    /// gap is left as holes.
    pub fn insert(&mut self, key: Key, value: V) -> Result<Option<V>> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => Ok(map.insert(name, value)),
            (Container::Array(items), Key::Index(i)) => items.insert(i, value),
            (container, key) => Err(Error::invalid_key(key, container.kind())),
        }
    }

    /// Removes the value at `key`. Sequences keep their length and leave a
    /// hole.
    pub fn remove(&mut self, key: &Key) -> Option<V> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.remove(name),
            (Container::Array(items), Key::Index(i)) => items.remove(*i),
            _ => None,
        }
    }

    /// Returns the present keys in iteration order.
    pub fn keys(&self) -> Vec<Key> {
        self.iter().map(|(k, _)| k).collect()
    }

    /// Returns an iterator over present `(key, value)` pairs in order.
    pub fn iter(&self) -> Iter<'_, V> {
        match self {
            Container::Object(map) => Iter::Object(map.entries.iter()),
            Container::Array(items) => Iter::Array(items.items.iter()),
        }
    }

    /// Returns an iterator over the present values in order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Builds a container of the same shape, key order and length from `f`.
    pub fn map<U>(&self, mut f: impl FnMut(&V) -> U) -> Container<U> {
        match self {
            Container::Object(map) => {
                let mut out = OrderedMap::with_capacity(map.len());
                for (k, v) in map.iter() {
                    out.insert(k.into(), f(v));
                }
                Container::Object(out)
            }
            Container::Array(items) => Container::Array(items.map(f)),
        }
    }
}

/// Iterator over the entries of a `Container`.
pub enum Iter<'a, V> {
    #[doc(hidden)]
    Object(core::slice::Iter<'a, (String, V)>),
    #[doc(hidden)]
    Array(btree_map::Iter<'a, usize, V>),
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Iter::Object(it) => it.next().map(|(k, v)| (Key::Field(k.clone()), v)),
            Iter::Array(it) => it.next().map(|(i, v)| (Key::Index(*i), v)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Iter::Object(it) => it.size_hint(),
            Iter::Array(it) => it.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_ordered_map_preserves_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert("b".into(), 1);
        map.insert("a".into(), 2);
        map.insert("c".into(), 3);

        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_ordered_map_replace_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert("x".into(), 1);
        map.insert("y".into(), 2);

        assert_eq!(map.insert("x".into(), 10), Some(1));
        let pairs: Vec<_> = map.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(pairs, vec![("x", 10), ("y", 2)]);
    }

    #[test]
    fn test_ordered_map_remove_repairs_index() {
        let mut map = OrderedMap::new();
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            map.insert((*k).into(), i);
        }

        assert_eq!(map.remove("b"), Some(1));
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("a"), Some(&0));
        assert_eq!(map.get("c"), Some(&2));
        assert_eq!(map.get("d"), Some(&3));
        assert!(!map.contains_key("b"));
        assert_eq!(map.remove("b"), None);
    }

    #[test]
    fn test_container_key_kind_checked() {
        let mut obj: Container<i32> = Container::empty(ContainerKind::Object);
        let err = obj.insert(Key::Index(0), 1).unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));

        let mut arr: Container<i32> = Container::empty(ContainerKind::Array);
        assert!(arr.insert(Key::from("a"), 1).is_err());
        assert!(arr.get(&Key::from("a")).is_none());
    }

    #[test]
    fn test_array_insert_past_end_leaves_holes() {
        let mut arr: Container<i32> = Container::empty(ContainerKind::Array);
        assert_eq!(arr.insert(Key::Index(0), 1).unwrap(), None);
        assert_eq!(arr.insert(Key::Index(3), 4).unwrap(), None);

        assert_eq!(arr.len(), 4);
        assert!(!arr.contains_key(&Key::Index(1)));
        assert_eq!(arr.keys(), vec![Key::Index(0), Key::Index(3)]);
        assert_eq!(arr.insert(Key::Index(0), 9).unwrap(), Some(1));
    }

    #[test]
    fn test_array_remove_leaves_hole() {
        let mut arr = Container::Array(Sequence::from_iter([1, 2, 3]));
        assert_eq!(arr.remove(&Key::Index(0)), Some(1));

        assert!(!arr.contains_key(&Key::Index(0)));
        assert_eq!(arr.get(&Key::Index(1)), Some(&2));
        assert_eq!(arr.get(&Key::Index(2)), Some(&3));
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.remove(&Key::Index(0)), None);
        assert_eq!(arr.remove(&Key::Index(5)), None);
        assert_eq!(arr.keys(), vec![Key::Index(1), Key::Index(2)]);
    }

    #[test]
    fn test_far_index_is_sparse_and_bounded() {
        let mut arr: Container<i32> = Container::empty(ContainerKind::Array);
        arr.insert(Key::Index(1 << 30), 1).unwrap();
        assert_eq!(arr.len(), (1 << 30) + 1);
        assert_eq!(arr.values().count(), 1);

        assert!(arr.check_key(&Key::Index(usize::MAX)).is_err());
        assert!(matches!(
            arr.insert(Key::Index(usize::MAX), 2),
            Err(Error::InvalidKey { .. })
        ));
        assert!(arr.insert(Key::Index(MAX_SEQUENCE_LEN), 2).is_err());
        assert_eq!(arr.len(), (1 << 30) + 1);
    }

    #[test]
    fn test_sequence_push_after_holes() {
        let mut seq: Sequence<&str> = Sequence::with_len(2);
        seq.push("x").unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.count(), 1);
        assert_eq!(seq.get(2), Some(&"x"));
        assert!(!seq.contains(0));
    }

    #[test]
    fn test_container_map_preserves_shape() {
        let mut map = OrderedMap::new();
        map.insert("z".into(), 1);
        map.insert("a".into(), 2);
        let obj = Container::Object(map);

        let doubled = obj.map(|v| v * 2);
        assert_eq!(doubled.kind(), ContainerKind::Object);
        assert_eq!(doubled.keys(), vec![Key::from("z"), Key::from("a")]);
        assert_eq!(doubled.get(&Key::from("a")), Some(&4));

        let mut seq = Sequence::with_len(4);
        seq.insert(1, 10).unwrap();
        let mapped = Container::Array(seq).map(|v| v + 1);
        assert_eq!(mapped.len(), 4);
        assert_eq!(mapped.keys(), vec![Key::Index(1)]);
        assert_eq!(mapped.get(&Key::Index(1)), Some(&11));
    }
}
