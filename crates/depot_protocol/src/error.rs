//! Error types for protocol decoding and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating client input.
///
/// These carry detail for server logs only. Clients always receive the same
/// generic failure message regardless of the variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input ended before a complete value could be read.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to continue.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A length prefix was negative or exceeds the allowed size.
    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),

    /// A JSON document did not match the expected schema.
    #[error("invalid json: {0}")]
    Json(String),

    /// A text field was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A field held a value outside its allowed range.
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A file name is not a safe relative path.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// The same file appears twice where names must be unique.
    #[error("duplicate file name: {0}")]
    DuplicateFile(String),

    /// An archive does not contain the requested entry.
    #[error("archive has no entry for {0}")]
    EntryNotFound(String),

    /// Bytes remained after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// A response did not start with a known status line.
    #[error("unknown response: {0:?}")]
    UnknownResponse(String),
}

impl ProtocolError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
