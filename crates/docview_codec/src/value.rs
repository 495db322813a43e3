//! Encoding of keys and values into their stored JSON form.
//!
//! Index rows store keys and values as compact JSON. The encoding is
//! deterministic: object members are emitted in sorted key order and no
//! whitespace is written, so two equal values always produce the same bytes.
//! The collator in [`crate::collate`] reads this form directly.

use crate::error::{CodecError, CodecResult};
use serde_json::Value;

/// Encodes a value into compact, canonical JSON bytes.
///
/// Encoding a [`Value`] cannot fail, so this returns the bytes directly.
pub fn encode(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Decodes JSON bytes into a [`Value`].
pub fn decode(bytes: &[u8]) -> CodecResult<Value> {
    serde_json::from_slice(bytes).map_err(CodecError::from)
}

/// Returns the JSON type name of a value, for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_members_are_sorted() {
        let value = json!({"z": 1, "a": 2, "m": [true, null]});
        assert_eq!(encode(&value), br#"{"a":2,"m":[true,null],"z":1}"#.to_vec());
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(&json!(null)), "null");
        assert_eq!(type_name(&json!(1.5)), "number");
        assert_eq!(type_name(&json!(["a"])), "array");
    }
}
