use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies the durable location of a preferences store.
///
/// A handle is immutable once created; engines and stores bound to it never
/// change where they read from or write to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreHandle(PathBuf);

impl StoreHandle {
    /// Wrap a path. No validation happens here; see the store locator for
    /// resolution and directory creation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Full path of the store file.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Directory that holds the store file.
    ///
    /// A bare relative file name lives in the current directory.
    pub fn directory(&self) -> &Path {
        match self.0.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// File name of the store, if the path has one.
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for StoreHandle {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for StoreHandle {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for StoreHandle {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}
