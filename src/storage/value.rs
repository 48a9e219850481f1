//! Field values seen by query predicates, and vertex key conversion

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A single field value of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Id(u128),
    Text(String),
    /// Operand of `In`
    List(Vec<Value>),
}

impl Value {
    /// Compare two values of the same kind. Values of different kinds are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, empty text and empty lists count as empty
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Id(v as u128)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Identity type of a vertex (DAG) or node (tree), supplied by the caller
///
/// Takes the place of runtime instantiation: each store is generic over the
/// key type and only needs to turn a key into a comparable [`Value`].
pub trait VertexKey:
    Clone + Eq + Ord + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn to_value(&self) -> Value;

    /// Malformed keys are rejected before any store access
    fn is_valid(&self) -> bool {
        true
    }
}

impl VertexKey for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn is_valid(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl VertexKey for u32 {
    fn to_value(&self) -> Value {
        Value::Id(*self as u128)
    }
}

impl VertexKey for u64 {
    fn to_value(&self) -> Value {
        Value::Id(*self as u128)
    }
}

impl VertexKey for u128 {
    fn to_value(&self) -> Value {
        Value::Id(*self)
    }
}

impl VertexKey for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

#[cfg(feature = "uuid")]
impl VertexKey for uuid::Uuid {
    fn to_value(&self) -> Value {
        Value::Id(self.as_u128())
    }

    fn is_valid(&self) -> bool {
        !self.is_nil()
    }
}
