use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key path {path:?}: {reason}")]
    InvalidKeyPath { path: String, reason: String },

    #[error("cannot descend into {segment:?}: found {found}, not a mapping")]
    NotAMapping { segment: String, found: &'static str },

    #[error("expected a mapping, found {found}")]
    ExpectedMapping { found: &'static str },

    #[error("serialization error: {0}")]
    Serialization(String),
}
