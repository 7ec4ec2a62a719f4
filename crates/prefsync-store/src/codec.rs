//! Structured text encoding of preference mappings.
//!
//! Stores are meant to be opened and edited by hand, so only text formats
//! are acceptable and decoding never evaluates anything.

use prefsync_types::{value_kind, PrefMap};
use serde_json::Value;

use crate::error::FormatError;

/// UTF-8 byte order mark some editors prepend when saving.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoder/decoder between a [`PrefMap`] and the bytes of a store file.
///
/// Implementations must satisfy `decode(&encode(m)?)? == m` for every
/// mapping they can encode, and must decode empty input to an empty mapping.
pub trait PrefCodec: Send + Sync {
    /// Codec name, for logs.
    fn name(&self) -> &'static str;

    /// File extension (without the dot) of files written by this codec.
    fn extension(&self) -> &'static str;

    /// Encode a mapping into a complete document.
    fn encode(&self, map: &PrefMap) -> Result<Vec<u8>, FormatError>;

    /// Decode a complete document into a mapping.
    fn decode(&self, bytes: &[u8]) -> Result<PrefMap, FormatError>;
}

/// JSON codec.
///
/// Pretty-printed output (the default) keeps the file readable; keys are
/// sorted so rewriting an unchanged mapping produces identical bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Single-line output.
    pub fn compact() -> Self {
        Self::new(false)
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PrefCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, map: &PrefMap) -> Result<Vec<u8>, FormatError> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(map)
        } else {
            serde_json::to_vec(map)
        }
        .map_err(|e| FormatError::Encode(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<PrefMap, FormatError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(PrefMap::new());
        }
        let value: Value = serde_json::from_slice(bytes).map_err(|e| FormatError::Syntax {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(PrefMap::new()),
            other => Err(FormatError::NotAMapping {
                found: value_kind(&other),
            }),
        }
    }
}
