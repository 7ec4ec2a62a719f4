use std::path::PathBuf;

use thiserror::Error;

/// Malformed or unencodable preference content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The document is not syntactically valid for the codec.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The document is valid but its top level is not a mapping.
    #[error("expected a mapping at the top level, found {found}")]
    NotAMapping { found: &'static str },

    /// A mapping could not be encoded.
    #[error("cannot encode preferences: {0}")]
    Encode(String),
}

/// Failure to resolve or prepare the location of a preferences store.
#[derive(Debug, Error)]
pub enum LocationError {
    /// No base configuration directory could be determined.
    #[error("no configuration or home directory available")]
    NoBaseDirectory,

    /// The application name cannot be turned into a directory name.
    #[error("invalid application name {name:?}: {reason}")]
    InvalidAppName { name: String, reason: String },

    /// The store file name is not a bare file name.
    #[error("invalid store file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: String },

    /// A directory on the way to the store could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store location exists but cannot be written.
    #[error("{path} is not writable: {reason}")]
    NotWritable { path: PathBuf, reason: String },
}

/// Errors from preference store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file exists but could not be opened or read.
    #[error("cannot read preferences store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file was read but does not decode to a mapping.
    #[error("preferences store {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// The store file could not be written. Previous content is intact.
    #[error("cannot write preferences store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mapping could not be encoded. Nothing was written.
    #[error("cannot encode preferences for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// The store location could not be resolved.
    #[error(transparent)]
    Location(#[from] LocationError),
}

impl StoreError {
    /// `true` for failures while reading, including malformed content.
    pub fn is_read_error(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Corrupt { .. })
    }

    /// `true` for failures while writing, including encoding failures.
    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Encode { .. })
    }

    /// The underlying format error, if this failure was caused by one.
    pub fn format_error(&self) -> Option<&FormatError> {
        match self {
            Self::Corrupt { source, .. } | Self::Encode { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
