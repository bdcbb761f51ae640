//! The document store - process-wide registry of live document sessions.
//!
//! Sessions are created on first access and kept for the life of the
//! process. The map is a `DashMap`, and creation goes through its entry
//! API, so concurrent first access to one id yields a single session.

use crate::state::DocumentSession;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mdsync_proto::DocId;
use std::sync::Arc;
use tracing::info;

/// Registry mapping document ids to their sessions.
#[derive(Default)]
pub struct DocumentStore {
    documents: DashMap<DocId, Arc<DocumentSession>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `id`, creating an empty one titled `title`
    /// if none exists yet. An existing session keeps its title.
    pub fn get_or_create(&self, id: DocId, title: &str) -> Arc<DocumentSession> {
        // Clone the Arc out so the shard lock is released before returning.
        let session = match self.documents.entry(id) {
            Entry::Occupied(entry) => return Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                Arc::clone(entry.insert(Arc::new(DocumentSession::new(id, title))).value())
            }
        };

        let count = self.documents.len();
        info!(doc_id = id, title = %title, documents = count, "Document session created");
        crate::metrics::set_documents(count);
        session
    }

    /// Look up an existing session without creating one.
    #[cfg(test)]
    pub fn get(&self, id: DocId) -> Option<Arc<DocumentSession>> {
        self.documents.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All live sessions, in no particular order.
    pub fn sessions(&self) -> Vec<Arc<DocumentSession>> {
        self.documents
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
