//! Keys addressing entries of a container.
//!
//! Objects are addressed by field name, sequences by position. A `Path` is
//! a sequence of keys walked from a root container.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// A key into an object (`Field`) or a sequence (`Index`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Named field of an object
    Field(String),
    /// Position in a sequence
    Index(usize),
}

/// A sequence of keys walked from a root container.
pub type Path = Vec<Key>;

impl Key {
    /// Returns the field name if this is a `Field`.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Key::Field(name) => Some(name.as_str()),
            Key::Index(_) => None,
        }
    }

    /// Returns the position if this is an `Index`.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.into())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Field(name.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}
