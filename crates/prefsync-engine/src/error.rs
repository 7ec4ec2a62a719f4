use std::path::PathBuf;

use prefsync_store::{FormatError, StoreError};
use prefsync_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Initialization failed; the engine was not created.
    #[error("failed to initialize preferences: {0}")]
    Initialization(#[source] Box<EngineError>),

    #[error("preference not found: {key}")]
    KeyNotFound { key: String },

    #[error("preferences engine is closed")]
    Closed,

    /// A validator refused the mutation; nothing was changed.
    #[error("preferences rejected: {reason}")]
    Rejected { reason: String },

    #[error("cannot convert {target}: {source}")]
    Type {
        target: String,
        #[source]
        source: serde_json::Error,
    },

    /// The default preferences do not form a mapping.
    #[error("invalid default preferences: {0}")]
    InvalidDefaults(#[source] TypeError),

    #[error("invalid key path: {0}")]
    InvalidPath(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl EngineError {
    pub(crate) fn initialization(inner: impl Into<EngineError>) -> Self {
        Self::Initialization(Box::new(inner.into()))
    }

    /// The storage-layer error behind this failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            Self::Initialization(inner) => inner.store_error(),
            _ => None,
        }
    }

    /// The malformed-content error behind this failure, if any.
    pub fn format_error(&self) -> Option<&FormatError> {
        self.store_error().and_then(StoreError::format_error)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
