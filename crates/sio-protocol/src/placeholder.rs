//! Binary attachment extraction and reconstruction.
//!
//! Encoding replaces every `Value::Bytes` leaf, depth-first, with a placeholder object
//! `{"_placeholder":true,"num":N}` where N is the order the leaf was visited in; decoding
//! reverses the substitution once all N buffers have arrived.

use indexmap::IndexMap;

use crate::error::CodecError;
use crate::value::Value;

const PLACEHOLDER_KEY: &str = "_placeholder";
const NUM_KEY: &str = "num";

fn placeholder_object(num: u64) -> Value {
    let mut map = IndexMap::new();
    map.insert(PLACEHOLDER_KEY.to_owned(), Value::Bool(true));
    map.insert(NUM_KEY.to_owned(), Value::from(num));
    Value::Object(map)
}

/// If `value` is a placeholder object, return its `num`.
pub fn as_placeholder(value: &Value) -> Option<u64> {
    let Value::Object(map) = value else {
        return None;
    };
    let is_placeholder = matches!(map.get(PLACEHOLDER_KEY), Some(Value::Bool(true)));
    if !is_placeholder {
        return None;
    }
    match map.get(NUM_KEY) {
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
}

/// Replace every `Bytes` leaf in `value`, depth-first, with a placeholder object. Returns
/// the rewritten tree plus the extracted buffers in arrival (placeholder `num`) order.
pub fn extract(value: Value) -> (Value, Vec<Vec<u8>>) {
    let mut buffers = Vec::new();
    let rewritten = extract_inner(value, &mut buffers);
    (rewritten, buffers)
}

fn extract_inner(value: Value, buffers: &mut Vec<Vec<u8>>) -> Value {
    match value {
        Value::Bytes(b) => {
            let num = buffers.len() as u64;
            buffers.push(b);
            placeholder_object(num)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| extract_inner(item, buffers))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, extract_inner(v, buffers)))
                .collect(),
        ),
        other => other,
    }
}

/// Count placeholder leaves in `value`, used to validate the attachment-count invariant.
pub fn count_placeholders(value: &Value) -> u64 {
    let mut count = 0;
    value.walk(&mut |node| {
        if as_placeholder(node).is_some() {
            count += 1;
        }
    });
    count
}

/// Replace every placeholder object, depth-first, with the buffer at its `num` index.
pub fn reconstruct(value: Value, buffers: &[Vec<u8>]) -> Result<Value, CodecError> {
    if let Some(num) = as_placeholder(&value) {
        let buf = buffers
            .get(num as usize)
            .ok_or(CodecError::PlaceholderOutOfRange(num, buffers.len() as u64))?;
        return Ok(Value::Bytes(buf.clone()));
    }
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(reconstruct(item, buffers)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, reconstruct(v, buffers)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_replaces_bytes_depth_first_and_numbers_in_order() {
        let tree = Value::Array(vec![
            Value::string("upload"),
            Value::Bytes(vec![1, 2]),
            Value::Array(vec![Value::Bytes(vec![3, 4])]),
        ]);
        let (rewritten, buffers) = extract(tree);
        assert_eq!(buffers, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(count_placeholders(&rewritten), 2);
    }

    #[test]
    fn reconstruct_reverses_extract() {
        let tree = Value::Array(vec![Value::string("upload"), Value::Bytes(vec![9, 9])]);
        let (rewritten, buffers) = extract(tree.clone());
        let restored = reconstruct(rewritten, &buffers).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn reconstruct_fails_on_out_of_range_placeholder() {
        let bad = placeholder_object(5);
        let err = reconstruct(bad, &[vec![1]]).unwrap_err();
        assert_eq!(err, CodecError::PlaceholderOutOfRange(5, 1));
    }
}
