use prefsync_types::{KeyPath, PrefMap};
use serde_json::Value;
use tracing::debug;

/// The result of merging a default set into stored preferences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    /// Stored preferences plus every default they were missing.
    pub effective: PrefMap,
    /// Paths of the keys taken from the defaults, depth-first in key order.
    pub added: Vec<KeyPath>,
}

impl MergeOutcome {
    /// Returns `true` if any default was added, i.e. the effective mapping
    /// differs from the stored one and should be persisted.
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

/// Merge `defaults` into `stored`.
///
/// For every key of `defaults` absent from `stored`, the default is added.
/// When both sides hold a mapping under the same key, the merge recurses into
/// it. In every other case the stored value wins, including when a stored
/// scalar sits where the defaults expect a mapping.
///
/// Pure and deterministic: no I/O, and the same inputs always produce the
/// same outcome.
pub fn merge_defaults(stored: &PrefMap, defaults: &PrefMap) -> MergeOutcome {
    let mut effective = stored.clone();
    let mut added = Vec::new();
    merge_into(&mut effective, defaults, None, &mut added);
    if !added.is_empty() {
        debug!(added = added.len(), "defaults merged into stored preferences");
    }
    MergeOutcome { effective, added }
}

fn merge_into(
    target: &mut PrefMap,
    defaults: &PrefMap,
    prefix: Option<&KeyPath>,
    added: &mut Vec<KeyPath>,
) {
    for (key, default) in defaults {
        let path = match prefix {
            Some(parent) => parent.child(key.clone()),
            None => KeyPath::key(key.clone()),
        };
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default.clone());
                added.push(path);
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(nested) = default {
                    merge_into(existing, nested, Some(&path), added);
                }
            }
            Some(_) => {}
        }
    }
}
