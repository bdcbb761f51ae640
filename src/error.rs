//! Unified error handling for mdsyncd.
//!
//! Every failure on the edit path is handled where it is detected and never
//! escalates past its component. The variants here exist so those places
//! can log with a stable code and count the failure.

use mdsync_proto::{DiffError, DocId, ProtocolError};
use thiserror::Error;

// ============================================================================
// Edit Errors (message decode, apply, delivery)
// ============================================================================

/// Errors that can occur while processing one inbound edit message.
#[derive(Debug, Error)]
pub enum EditError {
    /// The payload could not be decoded. The connection stays open.
    #[error("malformed message: {0}")]
    MalformedMessage(#[source] ProtocolError),

    /// A diff carries an operation type the applier does not know.
    #[error("unknown operation: {0}")]
    UnknownOperation(#[source] ProtocolError),

    /// The operation list overruns the document. Nothing is committed.
    #[error("operations out of range: {0}")]
    OutOfRange(#[from] DiffError),

    /// The message names a different document than the connection serves.
    #[error("message targets document {got}, connection serves {expected}")]
    WrongDocument { expected: DocId, got: DocId },

    /// The broadcast event could not be serialized.
    #[error("failed to encode broadcast: {0}")]
    Encode(#[source] ProtocolError),
}

impl From<ProtocolError> for EditError {
    fn from(err: ProtocolError) -> Self {
        if err.is_malformed() {
            Self::MalformedMessage(err)
        } else {
            Self::UnknownOperation(err)
        }
    }
}

impl EditError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedMessage(_) => "malformed_message",
            Self::UnknownOperation(_) => "unknown_operation",
            Self::OutOfRange(_) => "out_of_range",
            Self::WrongDocument { .. } => "wrong_document",
            Self::Encode(_) => "encode_error",
        }
    }
}

// ============================================================================
// Delivery Errors (per output channel)
// ============================================================================

/// A single output channel failed to take a broadcast.
///
/// Counted and skipped; never aborts delivery to the other channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The connection's outbound queue is full. The connection is evicted.
    #[error("outbound queue full")]
    QueueFull,
    /// The connection has gone away.
    #[error("channel closed")]
    Closed,
}

impl DeliveryFailure {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Transport Errors (connection lifetime)
// ============================================================================

/// Why a connection stopped reading.
#[derive(Debug, Error)]
pub enum TransportClosed {
    /// The client sent an edit message with `opt == 0`.
    #[error("client requested stop")]
    ClientStop,
    /// The client sent a WebSocket close frame or the stream ended.
    #[error("connection closed by peer")]
    PeerClosed,
    /// The connection's outbound queue overflowed and the session evicted it.
    #[error("outbound queue overflowed")]
    Lagging,
    /// The client queued more edits than the ordered worker holds.
    #[error("edit queue overflowed")]
    EditBacklog,
    /// Reading or writing the socket failed.
    #[error("transport error: {0}")]
    Io(#[from] tokio_tungstenite::tungstenite::Error),
}
