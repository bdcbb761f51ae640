//! Diff application.
//!
//! Operations are applied in list order against one cursor over the
//! *original* text. Retained spans are copied from the original, inserts
//! are appended verbatim, deletes skip. Text past the final cursor is not
//! carried over, so a well-formed diff covers the whole original.
//!
//! Offsets and counts are Unicode code points, never bytes.
//!
//! Application is all-or-nothing: any out-of-range step rejects the whole
//! operation list and the caller keeps its previous text.

use thiserror::Error;

use crate::error::ProtocolError;
use crate::message::{Diff, TYPE_DELETE, TYPE_INSERT, TYPE_RETAIN};

/// A single edit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Copy `n` code points from the original and advance the cursor.
    Retain(usize),
    /// Append the text to the output. The cursor does not move.
    Insert(String),
    /// Skip `n` code points of the original.
    Delete(usize),
}

impl Operation {
    /// Whether this step changes content (anything but retain).
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Retain(_))
    }
}

impl TryFrom<&Diff> for Operation {
    type Error = ProtocolError;

    fn try_from(diff: &Diff) -> Result<Self, Self::Error> {
        match diff.kind {
            TYPE_RETAIN => Ok(Self::Retain(diff.count)),
            TYPE_INSERT => Ok(Self::Insert(diff.value.clone())),
            TYPE_DELETE => Ok(Self::Delete(diff.count)),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

/// Rejection of an operation list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// A retain or delete would move the cursor past the end of the original.
    #[error("operation {index} moves cursor from {cursor} by {count} past length {len}")]
    OutOfRange {
        /// Position of the offending operation in the list.
        index: usize,
        /// Cursor before the operation.
        cursor: usize,
        /// Requested count.
        count: usize,
        /// Code-point length of the original text.
        len: usize,
    },
}

/// Result of a successful application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Candidate text, as code points.
    pub chars: Vec<char>,
    /// Whether any insert or delete was present.
    pub changed: bool,
}

impl Applied {
    /// The candidate text as a `String`.
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }
}

/// Apply `ops` to `original`.
pub fn apply(original: &[char], ops: &[Operation]) -> Result<Applied, DiffError> {
    let len = original.len();
    let mut cursor = 0usize;
    let mut changed = false;
    let mut out = Vec::with_capacity(len);

    for (index, op) in ops.iter().enumerate() {
        match op {
            Operation::Retain(count) => {
                let end = advance(cursor, *count, len, index)?;
                out.extend_from_slice(&original[cursor..end]);
                cursor = end;
            }
            Operation::Insert(value) => {
                out.extend(value.chars());
            }
            Operation::Delete(count) => {
                cursor = advance(cursor, *count, len, index)?;
            }
        }
        changed |= op.is_change();
    }

    Ok(Applied {
        chars: out,
        changed,
    })
}

fn advance(cursor: usize, count: usize, len: usize, index: usize) -> Result<usize, DiffError> {
    match cursor.checked_add(count) {
        Some(end) if end <= len => Ok(end),
        _ => Err(DiffError::OutOfRange {
            index,
            cursor,
            count,
            len,
        }),
    }
}
