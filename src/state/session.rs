//! Document sessions.
//!
//! A `DocumentSession` is the authoritative in-memory copy of one document
//! plus the output channels of every client attached to it.
//!
//! # Locking
//!
//! - `state` is the mutation guard. It is a `tokio::sync::Mutex` held for the
//!   whole read-apply-commit-broadcast sequence, so edits to one document
//!   never interleave and clients receive broadcasts in commit order.
//! - `outputs` has its own short-lived `parking_lot` lock, so attaching and
//!   detaching never wait on an in-flight edit.
//!
//! Newly attached channels only see future broadcasts. There is no snapshot
//! or replay on attach.

use crate::error::EditError;
use crate::state::ConnectionId;
use crate::state::fanout::{self, Delivery, Outbound, OutputChannel};
use chrono::{DateTime, Utc};
use mdsync_proto::{DocId, EditMessage, Operation, apply};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mutable document state, only reachable through the guard.
#[derive(Debug)]
pub(crate) struct DocumentState {
    title: String,
    /// Document body as Unicode code points.
    text: Vec<char>,
    modified_at: DateTime<Utc>,
}

/// Point-in-time copy of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub id: DocId,
    pub title: String,
    pub text: String,
    pub modified_at: DateTime<Utc>,
}

/// Outcome of an accepted edit message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommit {
    /// Text replaced and broadcast. Lagging channels have been evicted.
    Applied(Delivery),
    /// Nothing to commit: empty or retain-only operation list.
    Unchanged,
}

/// Live state for one document.
pub struct DocumentSession {
    id: DocId,
    state: Mutex<DocumentState>,
    outputs: RwLock<HashMap<ConnectionId, OutputChannel>>,
}

impl DocumentSession {
    /// Create an empty document with the given title.
    pub fn new(id: DocId, title: impl Into<String>) -> Self {
        Self {
            id,
            state: Mutex::new(DocumentState {
                title: title.into(),
                text: Vec::new(),
                modified_at: Utc::now(),
            }),
            outputs: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    /// Register an output channel for future broadcasts.
    pub fn attach(&self, conn: ConnectionId, output: OutputChannel) {
        self.outputs.write().insert(conn, output);
        debug!(doc_id = self.id, %conn, "Output channel attached");
    }

    /// Remove a connection's output channel. Returns whether it was attached.
    pub fn detach(&self, conn: ConnectionId) -> bool {
        let removed = self.outputs.write().remove(&conn).is_some();
        if removed {
            debug!(doc_id = self.id, %conn, "Output channel detached");
        }
        removed
    }

    /// Number of attached output channels.
    pub fn output_count(&self) -> usize {
        self.outputs.read().len()
    }

    /// Copy the current document state. Waits for any in-flight edit.
    pub async fn snapshot(&self) -> DocumentSnapshot {
        let state = self.state.lock().await;
        DocumentSnapshot {
            id: self.id,
            title: state.title.clone(),
            text: state.text.iter().collect(),
            modified_at: state.modified_at,
        }
    }

    /// Hold the document guard, as an in-flight edit would.
    #[cfg(test)]
    pub(crate) async fn guard(&self) -> tokio::sync::MutexGuard<'_, DocumentState> {
        self.state.lock().await
    }

    /// Apply an edit message and broadcast it if the text changed.
    ///
    /// Under the guard: the title is replaced unconditionally, then the
    /// operations are applied against the current text. Only a list that
    /// contains an insert or delete commits; the accepted message is then
    /// replayed to every attached channel, including the sender's.
    ///
    /// A rejected list leaves text and `modified_at` untouched and sends
    /// nothing. A channel whose queue is full has missed this broadcast and
    /// is detached, so its client is never fed diffs against a stale base.
    pub async fn apply_edit(&self, msg: &EditMessage) -> Result<EditCommit, EditError> {
        let payload: Outbound = Arc::from(msg.encode().map_err(EditError::Encode)?);

        let mut state = self.state.lock().await;
        state.title.clone_from(&msg.name);

        let ops: Vec<Operation> = msg.operations()?;
        if ops.is_empty() {
            return Ok(EditCommit::Unchanged);
        }

        let applied = apply(&state.text, &ops)?;
        if !applied.changed {
            return Ok(EditCommit::Unchanged);
        }

        state.text = applied.chars;
        state.modified_at = Utc::now();

        let delivery = fanout::broadcast(self.id, self.outputs.read().iter(), &payload);
        if !delivery.lagging.is_empty() {
            // Dropping the sender closes the queue once the client drains
            // what it already has; the connection then disconnects it.
            let mut outputs = self.outputs.write();
            for conn in &delivery.lagging {
                if outputs.remove(conn).is_some() {
                    warn!(doc_id = self.id, %conn, "Evicting lagging output channel");
                }
            }
        }
        Ok(EditCommit::Applied(delivery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConnectionIdGenerator;
    use mdsync_proto::Diff;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn edit(diffs: Vec<Diff>, name: &str, random_id: i64) -> EditMessage {
        EditMessage {
            diffs,
            name: name.to_string(),
            doc_id: 1,
            opt: 1,
            random_id,
            ..Default::default()
        }
    }

    async fn session_with_text(text: &str) -> DocumentSession {
        let session = DocumentSession::new(1, "doc");
        if !text.is_empty() {
            session
                .apply_edit(&edit(vec![Diff::insert(text)], "doc", 0))
                .await
                .unwrap();
        }
        session
    }

    #[tokio::test]
    async fn new_session_is_empty() {
        let session = DocumentSession::new(4, "Plans");
        let snap = session.snapshot().await;
        assert_eq!(snap.id, 4);
        assert_eq!(snap.title, "Plans");
        assert_eq!(snap.text, "");
        assert_eq!(session.output_count(), 0);
    }

    #[tokio::test]
    async fn append_broadcasts_original_message() {
        let session = session_with_text("hello").await;
        let ids = ConnectionIdGenerator::new();
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(ids.next(), tx);

        let msg = edit(vec![Diff::retain(5), Diff::insert(" world")], "greeting", 42);
        let commit = session.apply_edit(&msg).await.unwrap();

        assert_eq!(
            commit,
            EditCommit::Applied(Delivery {
                delivered: 1,
                failed: 0,
                lagging: Vec::new(),
            })
        );
        let snap = session.snapshot().await;
        assert_eq!(snap.text, "hello world");
        assert_eq!(snap.title, "greeting");

        let echoed = EditMessage::decode_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(echoed, msg);
        assert_eq!(echoed.random_id, 42);
    }

    #[tokio::test]
    async fn delete_without_insert_is_a_change() {
        let session = session_with_text("hello").await;
        let commit = session
            .apply_edit(&edit(vec![Diff::retain(2), Diff::delete(3)], "doc", 1))
            .await
            .unwrap();
        assert!(matches!(commit, EditCommit::Applied(_)));
        assert_eq!(session.snapshot().await.text, "he");
    }

    #[tokio::test]
    async fn retain_only_neither_changes_nor_broadcasts() {
        let session = session_with_text("abc").await;
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(ConnectionIdGenerator::new().next(), tx);
        let before = session.snapshot().await;

        let commit = session
            .apply_edit(&edit(vec![Diff::retain(3)], "renamed", 1))
            .await
            .unwrap();

        assert_eq!(commit, EditCommit::Unchanged);
        let after = session.snapshot().await;
        assert_eq!(after.text, before.text);
        assert_eq!(after.modified_at, before.modified_at);
        assert_eq!(after.title, "renamed");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_diff_list_only_updates_title() {
        let session = session_with_text("abc").await;
        let commit = session.apply_edit(&edit(vec![], "new title", 1)).await.unwrap();
        assert_eq!(commit, EditCommit::Unchanged);
        let snap = session.snapshot().await;
        assert_eq!(snap.text, "abc");
        assert_eq!(snap.title, "new title");
    }

    #[tokio::test]
    async fn out_of_range_retain_is_rejected_whole() {
        let session = session_with_text("hi").await;
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(ConnectionIdGenerator::new().next(), tx);
        let before = session.snapshot().await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let err = session
            .apply_edit(&edit(vec![Diff::insert("x"), Diff::retain(10)], "doc", 1))
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "out_of_range");
        let after = session.snapshot().await;
        assert_eq!(after.text, "hi");
        assert_eq!(after.modified_at, before.modified_at);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected() {
        let session = session_with_text("hi").await;
        let bogus = Diff {
            count: 1,
            kind: 9,
            value: String::new(),
        };
        let err = session
            .apply_edit(&edit(vec![bogus], "doc", 1))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "unknown_operation");
        assert_eq!(session.snapshot().await.text, "hi");
    }

    #[tokio::test]
    async fn modified_at_advances_on_commit() {
        let session = session_with_text("a").await;
        let before = session.snapshot().await.modified_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        session
            .apply_edit(&edit(vec![Diff::retain(1), Diff::insert("b")], "doc", 1))
            .await
            .unwrap();
        assert!(session.snapshot().await.modified_at > before);
    }

    #[tokio::test]
    async fn late_attach_sees_only_future_broadcasts() {
        let session = session_with_text("x").await;
        session
            .apply_edit(&edit(vec![Diff::retain(1), Diff::insert("y")], "doc", 1))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        session.attach(ConnectionIdGenerator::new().next(), tx);
        assert!(rx.try_recv().is_err());

        session
            .apply_edit(&edit(vec![Diff::retain(2), Diff::insert("z")], "doc", 2))
            .await
            .unwrap();
        let echoed = EditMessage::decode_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(echoed.random_id, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let session = session_with_text("").await;
        let ids = ConnectionIdGenerator::new();
        let conn = ids.next();
        let (tx, mut rx) = mpsc::channel(8);
        session.attach(conn, tx);

        assert!(session.detach(conn));
        assert!(!session.detach(conn));
        assert_eq!(session.output_count(), 0);

        session
            .apply_edit(&edit(vec![Diff::insert("a")], "doc", 1))
            .await
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failed_channel_does_not_block_others() {
        let session = session_with_text("").await;
        let ids = ConnectionIdGenerator::new();
        let (dead_tx, dead_rx) = mpsc::channel(8);
        drop(dead_rx);
        let (live_tx, mut live_rx) = mpsc::channel(8);
        session.attach(ids.next(), dead_tx);
        session.attach(ids.next(), live_tx);

        let commit = session
            .apply_edit(&edit(vec![Diff::insert("a")], "doc", 5))
            .await
            .unwrap();

        assert_eq!(
            commit,
            EditCommit::Applied(Delivery {
                delivered: 1,
                failed: 1,
                lagging: Vec::new(),
            })
        );
        assert!(live_rx.try_recv().is_ok());
        // Failed channels stay attached until their connection detaches.
        assert_eq!(session.output_count(), 2);
    }

    #[tokio::test]
    async fn overflowed_channel_is_evicted() {
        let session = session_with_text("").await;
        let ids = ConnectionIdGenerator::new();
        let slow = ids.next();
        let (tx, mut rx) = mpsc::channel(1);
        session.attach(slow, tx);

        session
            .apply_edit(&edit(vec![Diff::insert("a")], "doc", 1))
            .await
            .unwrap();
        let commit = session
            .apply_edit(&edit(vec![Diff::retain(1), Diff::insert("b")], "doc", 2))
            .await
            .unwrap();

        assert_eq!(
            commit,
            EditCommit::Applied(Delivery {
                delivered: 0,
                failed: 1,
                lagging: vec![slow],
            })
        );
        assert_eq!(session.output_count(), 0);

        session
            .apply_edit(&edit(vec![Diff::retain(2), Diff::insert("c")], "doc", 3))
            .await
            .unwrap();
        assert_eq!(session.snapshot().await.text, "abc");

        // The client gets the prefix it can still apply, then end of stream
        // instead of a diff against text it never saw.
        let first = EditMessage::decode_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.random_id, 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_edits_serialize() {
        let initial = "..........";
        let session = Arc::new(session_with_text(initial).await);
        let (tx, mut rx) = mpsc::channel(64);
        session.attach(ConnectionIdGenerator::new().next(), tx);

        // Length-preserving edits: each replaces one position, so every
        // list is valid whatever order the guard admits them in.
        let mut handles = Vec::new();
        for i in 0..32usize {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                let pos = i % 10;
                let letter = char::from(b'a' + (i % 26) as u8).to_string();
                let msg = edit(
                    vec![
                        Diff::retain(pos),
                        Diff::delete(1),
                        Diff::insert(letter),
                        Diff::retain(9 - pos),
                    ],
                    "doc",
                    i as i64,
                );
                session.apply_edit(&msg).await.unwrap()
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), EditCommit::Applied(_)));
        }

        // Broadcasts go out under the guard, so replaying them in arrival
        // order must reproduce the committed text exactly.
        let mut replay: Vec<char> = initial.chars().collect();
        let mut received = 0;
        while let Ok(payload) = rx.try_recv() {
            let msg = EditMessage::decode_str(&payload).unwrap();
            replay = apply(&replay, &msg.operations().unwrap()).unwrap().chars;
            received += 1;
        }
        assert_eq!(received, 32);

        let text = session.snapshot().await.text;
        assert_eq!(text.chars().count(), 10);
        assert_eq!(replay.iter().collect::<String>(), text);
    }

    #[tokio::test]
    async fn two_edits_never_mix() {
        let session = Arc::new(session_with_text("ab").await);
        let append = edit(vec![Diff::retain(2), Diff::insert("1")], "doc", 1);
        let prepend = edit(vec![Diff::insert("0"), Diff::retain(2)], "doc", 2);

        let (a, b) = tokio::join!(session.apply_edit(&append), session.apply_edit(&prepend));
        assert!(matches!(a.unwrap(), EditCommit::Applied(_)));
        assert!(matches!(b.unwrap(), EditCommit::Applied(_)));

        // append then prepend -> "0ab"; prepend then append -> "0a1".
        let text = session.snapshot().await.text;
        assert!(text == "0ab" || text == "0a1", "got {text}");
    }
}
