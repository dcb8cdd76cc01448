//! Payload tree carried inside a [`crate::packet::Packet`].
//!
//! `serde_json::Value` has no slot for a raw byte buffer, and the codec needs one: binary
//! attachments live in the tree until [`crate::placeholder`] extracts them. `Value` is the
//! same shape as JSON plus a `Bytes` leaf that only ever appears before encoding or after a
//! binary attachment has been reconstructed — it never reaches `serde_json` conversion itself.

use indexmap::IndexMap;
use serde_json::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    /// A raw binary attachment. Present only pre-encode (user-supplied) or post-decode
    /// (substituted back in during [`crate::placeholder::reconstruct`]).
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Recursively walk the tree, visiting every element depth-first (array/object entries
    /// in order). Used both by placeholder extraction and by the attachment-count invariant
    /// check in tests.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Value)) {
        f(self);
        match self {
            Value::Array(items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    v.walk(f);
                }
            }
            _ => {}
        }
    }

    /// Convert to `serde_json::Value`. Panics if a `Bytes` leaf remains — callers must run
    /// placeholder extraction first. This mirrors the codec's own invariant, not a general
    /// API guarantee, so it is not a `TryFrom`.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
            Value::Bytes(_) => {
                unreachable!("binary attachments must be placeholder-substituted before JSON encoding")
            }
        }
    }

    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json_when_no_bytes_present() {
        let v = Value::Array(vec![Value::string("msg"), Value::from(1u64), Value::Null]);
        let json = v.clone().into_json();
        let back = Value::from_json(json);
        assert_eq!(v, back);
    }

    #[test]
    fn walk_visits_nested_values_depth_first() {
        let v = Value::Array(vec![
            Value::string("a"),
            Value::Array(vec![Value::from(1u64), Value::from(2u64)]),
        ]);
        let mut seen = Vec::new();
        v.walk(&mut |node| seen.push(node.clone()));
        assert_eq!(seen.len(), 5); // root + "a" + inner array + 1 + 2
    }
}
