//! Validation hooks run before a mutation is persisted.

use prefsync_types::{value_kind, PrefMap};
use serde_json::Value;

/// Checks a candidate mapping before it replaces the effective preferences.
///
/// Returning `Err(reason)` rejects the mutation; the engine surfaces it as
/// `EngineError::Rejected` and changes nothing in memory or on disk.
pub trait PreferenceValidator: Send + Sync {
    fn check(&self, candidate: &PrefMap) -> Result<(), String>;
}

impl<F> PreferenceValidator for F
where
    F: Fn(&PrefMap) -> Result<(), String> + Send + Sync,
{
    fn check(&self, candidate: &PrefMap) -> Result<(), String> {
        self(candidate)
    }
}

/// Rejects values whose kind differs from the default for the same key.
///
/// Integers and floats are interchangeable, a `null` default accepts
/// anything, and nested mappings are checked recursively. Keys without a
/// default are not constrained.
#[derive(Clone, Debug)]
pub struct KindsMatchDefaults {
    defaults: PrefMap,
}

impl KindsMatchDefaults {
    pub fn new(defaults: PrefMap) -> Self {
        Self { defaults }
    }
}

impl PreferenceValidator for KindsMatchDefaults {
    fn check(&self, candidate: &PrefMap) -> Result<(), String> {
        check_kinds(&self.defaults, candidate, "")
    }
}

fn check_kinds(defaults: &PrefMap, candidate: &PrefMap, prefix: &str) -> Result<(), String> {
    for (key, default) in defaults {
        let Some(value) = candidate.get(key) else {
            continue;
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (default, value) {
            (Value::Null, _) => {}
            (Value::Number(_), Value::Number(_)) => {}
            (Value::Object(d), Value::Object(c)) => check_kinds(d, c, &path)?,
            (d, v) if value_kind(d) == value_kind(v) => {}
            (d, v) => {
                return Err(format!(
                    "{path} must be a {}, got a {}",
                    value_kind(d),
                    value_kind(v)
                ))
            }
        }
    }
    Ok(())
}
