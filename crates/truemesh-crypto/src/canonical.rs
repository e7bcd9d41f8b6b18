//! Canonical JSON encoding
//!
//! Object keys are sorted by their UTF-8 bytes at every depth and no
//! insignificant whitespace is emitted. Strings and numbers use the
//! `serde_json` encoding. Two logically equal values always produce the same
//! bytes regardless of the key order they were built with.

use serde::Serialize;
use serde_json::Value;

use crate::{sha256, CryptoError, CryptoResult, Hash256};

/// Encode a JSON value canonically
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out);
    out
}

/// Encode any serializable value canonically
pub fn to_canonical_vec<T: Serialize>(value: &T) -> CryptoResult<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| CryptoError::NotCanonical(e.to_string()))?;
    Ok(canonical_json(&value))
}

/// SHA-256 of the canonical encoding
pub fn canonical_hash<T: Serialize>(value: &T) -> CryptoResult<Hash256> {
    Ok(sha256(&to_canonical_vec(value)?))
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_value(item, out);
            }
            out.push(b'}');
        }
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    // Serializing a &str into a Vec cannot fail.
    let encoded = serde_json::to_vec(s).unwrap_or_default();
    out.extend_from_slice(&encoded);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[1,2],"x":"s"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":"s","y":[1,2]},"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            String::from_utf8(canonical_json(&a)).unwrap(),
            r#"{"a":{"x":"s","y":[1,2]},"b":1}"#
        );
    }

    #[test]
    fn test_strings_are_escaped() {
        let value = json!({"q": "say \"hi\"\n"});
        assert_eq!(
            String::from_utf8(canonical_json(&value)).unwrap(),
            r#"{"q":"say \"hi\"\n"}"#
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            canonical_hash(&json!([1, 2])).unwrap(),
            canonical_hash(&json!([2, 1])).unwrap()
        );
    }
}
