//! Primitive (non-container) values.
//!
//! Primitives are copied by value into snapshots and compared by value in
//! change detection. Containers never appear here.

use alloc::string::String;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A scalar value stored verbatim in a container slot.
#[derive(Clone, Debug, Default)]
pub enum Primitive {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
}

impl Primitive {
    /// Returns a short name for the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "int",
            Primitive::Float(_) => "float",
            Primitive::String(_) => "string",
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Primitive::Null)
    }

    /// Returns the boolean value if this is a Bool, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Int, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric value as f64 for Int and Float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Int(v) => Some(*v as f64),
            Primitive::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::Null, Primitive::Null) => true,
            (Primitive::Bool(a), Primitive::Bool(b)) => a == b,
            (Primitive::Int(a), Primitive::Int(b)) => a == b,
            (Primitive::Float(a), Primitive::Float(b)) => {
                // NaN equals itself so an untouched NaN field never reads as changed
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Primitive::String(a), Primitive::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Primitive {}

impl Hash for Primitive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Primitive::Null => {}
            Primitive::Bool(b) => b.hash(state),
            Primitive::Int(i) => i.hash(state),
            Primitive::Float(f) => {
                if f.is_nan() {
                    f64::NAN.to_bits().hash(state)
                } else if *f == 0.0 {
                    0u64.hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            Primitive::String(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Null => f.write_str("null"),
            Primitive::Bool(b) => write!(f, "{}", b),
            Primitive::Int(i) => write!(f, "{}", i),
            Primitive::Float(x) => write!(f, "{}", x),
            Primitive::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Primitive::Int(v as i64)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::Int(v)
    }
}

impl From<u32> for Primitive {
    fn from(v: u32) -> Self {
        Primitive::Int(v as i64)
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Float(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::String(v.into())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::String(v)
    }
}

impl<T: Into<Primitive>> From<Option<T>> for Primitive {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Primitive::Null)
    }
}
