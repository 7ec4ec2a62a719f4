use std::path::{Path, PathBuf};

/// Where an engine's store lives: derived from an application name, or an
/// explicit file path used verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreSource {
    App(String),
    Path(PathBuf),
}

impl StoreSource {
    pub fn app(name: impl Into<String>) -> Self {
        Self::App(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// The application name, or an empty string for explicit paths.
    pub fn app_name(&self) -> &str {
        match self {
            Self::App(name) => name,
            Self::Path(_) => "",
        }
    }

    pub fn explicit_path(&self) -> Option<&Path> {
        match self {
            Self::App(_) => None,
            Self::Path(path) => Some(path),
        }
    }
}

impl From<&str> for StoreSource {
    fn from(name: &str) -> Self {
        Self::app(name)
    }
}

impl From<String> for StoreSource {
    fn from(name: String) -> Self {
        Self::App(name)
    }
}

impl From<PathBuf> for StoreSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for StoreSource {
    fn from(path: &Path) -> Self {
        Self::path(path)
    }
}
