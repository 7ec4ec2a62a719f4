//! Dotted key paths for hierarchical access into nested mappings.
//!
//! `"window.size.width"` addresses `map["window"]["size"]["width"]`. Paths
//! are always explicit: flat engine operations treat a key containing dots as
//! one literal key, and only operations taking a [`KeyPath`] descend.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::TypeError;
use crate::value::{value_kind, PrefMap};

/// Separator between path segments in the textual form.
pub const SEPARATOR: char = '.';

/// A non-empty sequence of mapping keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parse a dotted path.
    ///
    /// # Examples
    ///
    /// ```
    /// use prefsync_types::KeyPath;
    ///
    /// let path = KeyPath::parse("window.size").unwrap();
    /// assert_eq!(path.segments(), ["window", "size"]);
    /// assert!(KeyPath::parse("").is_err());
    /// assert!(KeyPath::parse("a..b").is_err());
    /// ```
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        if path.is_empty() {
            return Err(TypeError::InvalidKeyPath {
                path: path.to_string(),
                reason: "path must not be empty".into(),
            });
        }
        let segments: Vec<String> = path.split(SEPARATOR).map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(TypeError::InvalidKeyPath {
                path: path.to_string(),
                reason: "path segments must not be empty".into(),
            });
        }
        Ok(Self { segments })
    }

    /// Build a path from raw mapping keys. Keys are taken literally: they may
    /// contain the separator or be empty, which the textual form cannot
    /// express.
    ///
    /// The `Display` form of such a path is ambiguous: `["a.b"]` and
    /// `["a", "b"]` both print as `a.b`. Compare paths by value, not by
    /// their text.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(TypeError::InvalidKeyPath {
                path: String::new(),
                reason: "path must have at least one segment".into(),
            });
        }
        Ok(Self { segments })
    }

    /// A single-segment path addressing a top-level key.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            segments: vec![key.into()],
        }
    }

    /// The path extended by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Look up the value at this path.
    pub fn get<'a>(&self, map: &'a PrefMap) -> Option<&'a Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = map;
        for segment in parents {
            current = current.get(segment)?.as_object()?;
        }
        current.get(last)
    }

    /// Set the value at this path, creating intermediate mappings as needed.
    ///
    /// Returns the previous value, if any. Fails without modifying `map` when
    /// an intermediate segment exists but holds a non-mapping value.
    pub fn insert(&self, map: &mut PrefMap, value: Value) -> Result<Option<Value>, TypeError> {
        self.check_descendable(map)?;
        let (last, parents) = self
            .segments
            .split_last()
            .ok_or_else(|| TypeError::InvalidKeyPath {
                path: String::new(),
                reason: "path must not be empty".into(),
            })?;
        let mut current = map;
        for segment in parents {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(PrefMap::new()));
            current = match slot {
                Value::Object(inner) => inner,
                other => {
                    return Err(TypeError::NotAMapping {
                        segment: segment.clone(),
                        found: value_kind(other),
                    })
                }
            };
        }
        Ok(current.insert(last.clone(), value))
    }

    /// Remove and return the value at this path. Intermediate mappings left
    /// empty are kept.
    pub fn remove(&self, map: &mut PrefMap) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = map;
        for segment in parents {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(last)
    }

    fn check_descendable(&self, map: &PrefMap) -> Result<(), TypeError> {
        let mut current = map;
        for segment in &self.segments[..self.segments.len().saturating_sub(1)] {
            match current.get(segment) {
                None => return Ok(()),
                Some(Value::Object(inner)) => current = inner,
                Some(other) => {
                    return Err(TypeError::NotAMapping {
                        segment: segment.clone(),
                        found: value_kind(other),
                    })
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for KeyPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
