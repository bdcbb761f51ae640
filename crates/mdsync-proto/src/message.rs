//! Edit messages as they travel over the wire.
//!
//! The same JSON shape is used in both directions: clients send an
//! [`EditMessage`] describing their change, and the server replays the
//! accepted message verbatim to every client attached to the document.
//!
//! Missing fields decode to their zero value and `"diffs": null` decodes
//! to an empty list, so partially filled payloads from browser clients are
//! accepted.

use serde::{Deserialize, Deserializer, Serialize};

use crate::diff::Operation;
use crate::error::Result;
use crate::{CorrelationId, DocId};

/// Wire tag for a retain diff.
pub const TYPE_RETAIN: u8 = 0;
/// Wire tag for an insert diff.
pub const TYPE_INSERT: u8 = 1;
/// Wire tag for a delete diff.
pub const TYPE_DELETE: u8 = 2;

/// One diff entry of an edit message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diff {
    /// Number of code points retained or deleted. Informational for inserts.
    pub count: usize,
    /// Operation tag: `0` retain, `1` insert, `2` delete.
    #[serde(rename = "type")]
    pub kind: u8,
    /// Inserted text. Ignored for retain and delete.
    pub value: String,
}

impl Diff {
    /// A retain diff over `count` code points.
    pub fn retain(count: usize) -> Self {
        Self {
            count,
            kind: TYPE_RETAIN,
            value: String::new(),
        }
    }

    /// An insert diff carrying `value`.
    pub fn insert(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            count: value.chars().count(),
            kind: TYPE_INSERT,
            value,
        }
    }

    /// A delete diff over `count` code points.
    pub fn delete(count: usize) -> Self {
        Self {
            count,
            kind: TYPE_DELETE,
            value: String::new(),
        }
    }
}

/// What the client asks the server to do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `opt == 0`: stop reading on this connection.
    Close,
    /// Any other `opt`: apply the diffs.
    Apply,
}

/// An edit message, inbound from a client or replayed on broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditMessage {
    /// Full document body as seen by the client. Not used when applying.
    pub mark_down: String,
    /// Ordered diff list, interpreted against the pre-edit text.
    #[serde(deserialize_with = "null_as_empty")]
    pub diffs: Vec<Diff>,
    /// Requested document title.
    pub name: String,
    /// Target document.
    pub doc_id: DocId,
    /// Operation flag, see [`OpKind`].
    pub opt: i64,
    /// Correlation id echoed back on broadcast.
    pub random_id: CorrelationId,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Diff>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<Diff>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl EditMessage {
    /// Decode a message from raw frame bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode a message from a text frame.
    pub fn decode_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize the message to its JSON wire form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The operation flag as an [`OpKind`].
    pub fn kind(&self) -> OpKind {
        if self.opt == 0 {
            OpKind::Close
        } else {
            OpKind::Apply
        }
    }

    /// Interpret the diff list as typed operations.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        self.diffs.iter().map(Operation::try_from).collect()
    }
}
