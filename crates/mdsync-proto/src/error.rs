//! Error types for the mdsync protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while decoding or interpreting an edit message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The payload is not a valid edit message.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A binary frame did not carry UTF-8 text.
    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A diff entry carries a `type` outside retain/insert/delete.
    #[error("unknown operation type {0}")]
    UnknownOperation(u8),
}

impl ProtocolError {
    /// Whether the error came from a payload that could not be decoded at all.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Utf8(_))
    }
}
