//! Key-level diff between two preference mappings.

use prefsync_types::PrefMap;
use serde_json::Value;

/// The result of comparing two mappings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MapDiff {
    pub changes: Vec<MapChange>,
}

impl MapDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn additions(&self) -> usize {
        self.count(|c| matches!(c, MapChange::Added { .. }))
    }

    pub fn removals(&self) -> usize {
        self.count(|c| matches!(c, MapChange::Removed { .. }))
    }

    pub fn modifications(&self) -> usize {
        self.count(|c| matches!(c, MapChange::Modified { .. }))
    }

    /// Keys touched by any change, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(MapChange::key)
    }

    fn count(&self, pred: impl Fn(&MapChange) -> bool) -> usize {
        self.changes.iter().filter(|c| pred(c)).count()
    }
}

/// A single top-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapChange {
    Added { key: String, value: Value },
    Removed { key: String, value: Value },
    Modified { key: String, old: Value, new: Value },
}

impl MapChange {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Modified { key, .. } => key,
        }
    }
}

/// Compare `old` and `new` by top-level key.
///
/// Keys only in `new` are `Added`, keys only in `old` are `Removed`, keys in
/// both with different values are `Modified`. Changes are ordered by key.
pub fn diff_maps(old: &PrefMap, new: &PrefMap) -> MapDiff {
    let mut changes = Vec::new();

    for (key, old_val) in old {
        match new.get(key) {
            Some(new_val) if new_val != old_val => changes.push(MapChange::Modified {
                key: key.clone(),
                old: old_val.clone(),
                new: new_val.clone(),
            }),
            Some(_) => {}
            None => changes.push(MapChange::Removed {
                key: key.clone(),
                value: old_val.clone(),
            }),
        }
    }

    for (key, new_val) in new {
        if !old.contains_key(key) {
            changes.push(MapChange::Added {
                key: key.clone(),
                value: new_val.clone(),
            });
        }
    }

    changes.sort_by(|a, b| a.key().cmp(b.key()));
    MapDiff { changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> PrefMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn identical_maps() {
        let m = map(json!({"a": 1, "b": {"c": 2}}));
        assert!(diff_maps(&m, &m).is_empty());
    }

    #[test]
    fn all_change_kinds() {
        let old = map(json!({"gone": 1, "same": 2, "edited": {"x": 1}}));
        let new = map(json!({"same": 2, "edited": {"x": 2}, "fresh": true}));
        let diff = diff_maps(&old, &new);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff.additions(), 1);
        assert_eq!(diff.removals(), 1);
        assert_eq!(diff.modifications(), 1);
        assert_eq!(diff.keys().collect::<Vec<_>>(), ["edited", "fresh", "gone"]);
        assert_eq!(
            diff.changes[0],
            MapChange::Modified { key: "edited".into(), old: json!({"x": 1}), new: json!({"x": 2}) }
        );
    }

    #[test]
    fn from_empty() {
        let diff = diff_maps(&PrefMap::new(), &map(json!({"a": 1, "b": 2})));
        assert_eq!(diff.additions(), 2);
        assert_eq!(diff.removals(), 0);
    }
}
