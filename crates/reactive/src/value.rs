//! Values written into state nodes.
//!
//! A `Value` is what `set` accepts and `get` returns: a primitive, a plain
//! object or array literal (wrapped into a fresh state node on write), an
//! existing state node (shared, never re-wrapped), or a pending computation.

use crate::node::StateNode;
use crate::pending::Pending;
use alloc::string::String;
use alloc::vec::Vec;
use ripple_core::Primitive;

/// A value that can be stored at a key of a state node.
#[derive(Clone, Debug)]
pub enum Value {
    /// Scalar stored verbatim
    Primitive(Primitive),
    /// Plain sequence, wrapped into a new node on write
    Array(Vec<Value>),
    /// Sequence of length `len` with values only at the listed indices.
    /// Deep copies of arrays with deleted positions come back in this form.
    Sparse { len: usize, items: Vec<(usize, Value)> },
    /// Plain object in insertion order, wrapped into a new node on write
    Object(Vec<(String, Value)>),
    /// Existing state node, shared by every parent that stores it
    State(StateNode),
    /// Computation whose result is written back when it settles
    Pending(Pending),
}

impl Default for Value {
    fn default() -> Self {
        Value::Primitive(Primitive::Null)
    }
}

impl Value {
    /// Returns the null value.
    #[inline]
    pub fn null() -> Self {
        Value::Primitive(Primitive::Null)
    }

    /// Builds an object literal from `(key, value)` pairs, keeping their order.
    pub fn object<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds an array literal.
    pub fn array<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Returns a short name for the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Primitive(p) => p.type_name(),
            Value::Array(_) | Value::Sparse { .. } => "array",
            Value::Object(_) => "object",
            Value::State(_) => "state node",
            Value::Pending(_) => "pending computation",
        }
    }

    /// Returns true for values that become (or already are) state nodes.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Sparse { .. } | Value::Object(_) | Value::State(_)
        )
    }

    /// Returns the primitive if this is one.
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the state node if this is one.
    pub fn as_state(&self) -> Option<&StateNode> {
        match self {
            Value::State(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the pending computation if this is one.
    pub fn as_pending(&self) -> Option<&Pending> {
        match self {
            Value::Pending(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the integer if this is an integer primitive.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive().and_then(Primitive::as_i64)
    }

    /// Returns the string if this is a string primitive.
    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }
}

impl From<Primitive> for Value {
    fn from(v: Primitive) -> Self {
        Value::Primitive(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Primitive(v.into())
    }
}

impl From<StateNode> for Value {
    fn from(node: StateNode) -> Self {
        Value::State(node)
    }
}

impl From<&StateNode> for Value {
    fn from(node: &StateNode) -> Self {
        Value::State(node.clone())
    }
}

impl From<Pending> for Value {
    fn from(p: Pending) -> Self {
        Value::Pending(p)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_value_literals() {
        let v = Value::object([("a", Value::from(1)), ("b", Value::array([1, 2]))]);
        match v {
            Value::Object(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].0, "a");
                assert!(matches!(entries[1].1, Value::Array(ref items) if items.len() == 2));
            }
            other => panic!("expected object, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(3).as_i64(), Some(3));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::from(None::<i64>).as_primitive().unwrap().is_null());
        assert!(Value::from(vec![1, 2, 3]).is_container());
        assert!(!Value::from(true).is_container());
        let sparse = Value::Sparse { len: 3, items: vec![(2, Value::from(1))] };
        assert!(sparse.is_container());
        assert_eq!(sparse.type_name(), "array");
        assert_eq!(Value::null().type_name(), "null");
    }
}
