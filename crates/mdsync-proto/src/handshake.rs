//! Upgrade request parameters.
//!
//! A connection serves exactly one document, chosen by the `DocName` and
//! `DocId` query parameters of the WebSocket upgrade request.

use thiserror::Error;
use url::form_urlencoded;

use crate::DocId;

/// Query parameter carrying the document display name.
pub const PARAM_DOC_NAME: &str = "DocName";
/// Query parameter carrying the document id.
pub const PARAM_DOC_ID: &str = "DocId";

/// Reasons an upgrade request does not name a usable document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// `DocName` is absent or empty.
    #[error("missing DocName parameter")]
    MissingDocName,
    /// `DocId` is absent.
    #[error("missing DocId parameter")]
    MissingDocId,
    /// `DocId` is not an integer.
    #[error("DocId is not an integer: {0:?}")]
    InvalidDocId(String),
    /// `DocId` is zero or negative.
    #[error("DocId must be positive, got {0}")]
    NonPositiveDocId(DocId),
}

/// The document a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocTarget {
    /// Document id, always `> 0`.
    pub id: DocId,
    /// Display name supplied by the client; becomes the title of a new session.
    pub name: String,
}

impl DocTarget {
    /// Parse the query component of an upgrade URI (without the leading `?`).
    pub fn from_query(query: Option<&str>) -> Result<Self, HandshakeError> {
        let mut name = None;
        let mut id = None;
        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                PARAM_DOC_NAME => name = Some(value.into_owned()),
                PARAM_DOC_ID => id = Some(value.into_owned()),
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or(HandshakeError::MissingDocName)?;
        let raw_id = id.ok_or(HandshakeError::MissingDocId)?;
        let id: DocId = raw_id
            .trim()
            .parse()
            .map_err(|_| HandshakeError::InvalidDocId(raw_id.clone()))?;
        if id <= 0 {
            return Err(HandshakeError::NonPositiveDocId(id));
        }

        Ok(Self { id, name })
    }
}
