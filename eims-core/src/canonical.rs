//! Deterministic JSON canonicalization used as the exact signature input.
//!
//! The authority verifies signatures over a canonical encoding: no
//! insignificant whitespace, keys sorted lexicographically at every nesting
//! level, UTF-8 bytes. Two payloads with the same logical content always
//! canonicalize to identical bytes regardless of construction order.
use serde_json::Value;
use thiserror::Error;

/// Errors produced while canonicalizing a request body.
///
/// Internally constructed payloads are always serializable, so hitting this
/// for one of them is a programming defect, not a recoverable condition.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("value cannot be canonicalized: {0}")]
    Unserializable(#[from] serde_json::Error),
}

/// Canonicalize a JSON value into its signature byte form.
///
/// # Examples
/// ```rust
/// use serde_json::json;
/// use eims_core::canonical::canonical_json;
///
/// let bytes = canonical_json(&json!({"b": 1, "a": {"z": 2, "y": 3}}))?;
/// assert_eq!(bytes, br#"{"a":{"y":3,"z":2},"b":1}"#);
/// # Ok::<(), eims_core::canonical::EncodingError>(())
/// ```
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    write_canonical(&mut out, value)?;
    Ok(out)
}

fn write_canonical(out: &mut Vec<u8>, value: &Value) -> Result<(), EncodingError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(out, &map[key.as_str()])?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(out, item)?;
            }
            out.push(b']');
        }
        leaf => {
            serde_json::to_writer(&mut *out, leaf)?;
        }
    }
    Ok(())
}
