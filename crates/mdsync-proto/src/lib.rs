//! # mdsync-proto
//!
//! Wire format and diff application for the mdsyncd collaborative
//! document protocol.
//!
//! ## Features
//!
//! - JSON edit messages (`EditMessage`, `Diff`) exactly as exchanged over
//!   the WebSocket, including the echo sent back on broadcast
//! - A typed `Operation` model (retain / insert / delete)
//! - The pure diff applier, operating on Unicode code points
//! - Parsing of the `DocName` / `DocId` upgrade query
//!
//! ## Quick Start
//!
//! ```rust
//! use mdsync_proto::{apply, EditMessage};
//!
//! let raw = br#"{"diffs":[{"count":5,"type":0,"value":""},
//!                 {"count":6,"type":1,"value":" world"}],
//!                "name":"notes","doc_id":7,"opt":1,"random_id":42}"#;
//! let msg = EditMessage::decode(raw).expect("valid edit message");
//! let ops = msg.operations().expect("known operation types");
//!
//! let original: Vec<char> = "hello".chars().collect();
//! let applied = apply(&original, &ops).expect("in range");
//! assert!(applied.changed);
//! assert_eq!(applied.text(), "hello world");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod diff;
pub mod error;
pub mod handshake;
pub mod message;

pub use self::diff::{apply, Applied, DiffError, Operation};
pub use self::error::{ProtocolError, Result};
pub use self::handshake::{DocTarget, HandshakeError};
pub use self::message::{Diff, EditMessage, OpKind};

/// Document identifier as assigned by the document-creation flow.
pub type DocId = i64;

/// Caller-supplied correlation id echoed back on broadcast.
pub type CorrelationId = i64;
