//! Preference values and mappings.
//!
//! Values are plain `serde_json` values so any structured text encoding that
//! round-trips JSON data can hold them without loss.

use serde::Serialize;
use serde_json::Value;

use crate::error::TypeError;

/// A single preference value.
pub type PrefValue = Value;

/// A mapping of preference keys to values. Keys are kept sorted, so the
/// encoded form of a mapping is deterministic.
pub type PrefMap = serde_json::Map<String, Value>;

/// Short, human-readable name of a value's kind, used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Serialize any value into a [`PrefMap`].
///
/// Fails if serialization fails or the value does not serialize to a mapping
/// (for example a bare integer or a tuple struct).
pub fn to_pref_map<T: Serialize>(value: &T) -> Result<PrefMap, TypeError> {
    match serde_json::to_value(value).map_err(|e| TypeError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(TypeError::ExpectedMapping {
            found: value_kind(&other),
        }),
    }
}
