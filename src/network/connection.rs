//! Connection - per-client read loop for one document.
//!
//! A connection is bound to a single document session for its lifetime.
//! It attaches an outbound queue to the session, then multiplexes two
//! sources in one `select!` loop:
//!
//! - inbound frames, decoded and dispatched as edits
//! - broadcast payloads from the session, written back to the socket
//!
//! Edits never run on the read loop itself, so a busy document guard
//! does not stall reading. How they leave the loop is set by
//! [`DispatchMode`].

use crate::config::{DispatchMode, SyncConfig};
use crate::error::{EditError, TransportClosed};
use crate::metrics::{self, EditOutcome};
use crate::state::{ConnectionId, DocumentSession, DocumentStore, EditCommit, Outbound};
use crate::telemetry::{EditTimer, spans};
use futures_util::{SinkExt, StreamExt};
use mdsync_proto::{DocTarget, EditMessage, OpKind};
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{Instrument, debug, info, warn};

/// A client connection handler.
pub struct Connection<S> {
    id: ConnectionId,
    addr: SocketAddr,
    target: DocTarget,
    stream: WebSocketStream<S>,
    store: Arc<DocumentStore>,
    sync: SyncConfig,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Create a handler for an upgraded socket bound to `target`.
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        target: DocTarget,
        stream: WebSocketStream<S>,
        store: Arc<DocumentStore>,
        sync: SyncConfig,
    ) -> Self {
        Self {
            id,
            addr,
            target,
            stream,
            store,
            sync,
        }
    }

    /// Run the connection until the client stops, the peer closes, or the
    /// transport fails. The output channel is detached on every exit path.
    pub async fn run(self) -> Result<(), TransportClosed> {
        let conn = self.id.to_string();
        let span = spans::connection(&conn, self.target.id, self.addr);
        self.serve().instrument(span).await
    }

    async fn serve(self) -> Result<(), TransportClosed> {
        let Self {
            id,
            target,
            stream,
            store,
            sync,
            ..
        } = self;

        let session = store.get_or_create(target.id, &target.name);
        let (output, outbound) = mpsc::channel(sync.outbound_queue.max(1));
        session.attach(id, output);
        metrics::connection_opened();
        info!(
            title = %target.name,
            outputs = session.output_count(),
            "Client attached to document"
        );

        let reader = Reader {
            dispatcher: Dispatcher::start(&sync, &session),
            session: Arc::clone(&session),
        };
        let reason = reader.event_loop(stream, outbound).await;

        session.detach(id);
        metrics::connection_closed();

        match reason {
            TransportClosed::Io(e) => {
                warn!(error = %e, "Connection ended with transport error");
                Err(TransportClosed::Io(e))
            }
            behind @ (TransportClosed::Lagging | TransportClosed::EditBacklog) => {
                warn!(reason = %behind, "Client fell behind, disconnecting");
                Ok(())
            }
            other => {
                info!(reason = %other, "Client detached from document");
                Ok(())
            }
        }
    }
}

/// Read-side state owned by the event loop.
struct Reader {
    session: Arc<DocumentSession>,
    dispatcher: Dispatcher,
}

impl Reader {
    async fn event_loop<S>(
        &self,
        stream: WebSocketStream<S>,
        mut outbound: mpsc::Receiver<Outbound>,
    ) -> TransportClosed
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut frames) = stream.split();

        let reason = loop {
            tokio::select! {
                frame = frames.next() => {
                    let flow = match frame {
                        Some(Ok(Message::Text(text))) => self.on_payload(text.as_bytes()),
                        Some(Ok(Message::Binary(bytes))) => self.on_payload(&bytes),
                        Some(Ok(Message::Close(_))) | None => ControlFlow::Break(TransportClosed::PeerClosed),
                        // Ping/pong replies are handled by tungstenite.
                        Some(Ok(_)) => ControlFlow::Continue(()),
                        Some(Err(e)) => ControlFlow::Break(TransportClosed::Io(e)),
                    };
                    if let ControlFlow::Break(reason) = flow {
                        break reason;
                    }
                }
                payload = outbound.recv() => {
                    // The session only drops our sender when the queue overflowed.
                    let Some(payload) = payload else {
                        break TransportClosed::Lagging;
                    };
                    if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                        break TransportClosed::Io(e);
                    }
                }
            }
        };

        match reason {
            TransportClosed::ClientStop => {
                let _ = sink.send(Message::Close(None)).await;
            }
            TransportClosed::Lagging | TransportClosed::EditBacklog => {
                let frame = CloseFrame {
                    code: CloseCode::Again,
                    reason: reason.to_string().into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
            }
            TransportClosed::PeerClosed | TransportClosed::Io(_) => {}
        }
        reason
    }

    /// Handle one inbound payload. Breaks when the client asks to stop or
    /// has more edits waiting than the ordered worker will hold.
    fn on_payload(&self, payload: &[u8]) -> ControlFlow<TransportClosed> {
        let msg = match EditMessage::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                reject(&EditError::from(e));
                return ControlFlow::Continue(());
            }
        };

        if msg.kind() == OpKind::Close {
            debug!(correlation_id = msg.random_id, "Client requested stop");
            return ControlFlow::Break(TransportClosed::ClientStop);
        }

        let expected = self.session.id();
        if msg.doc_id != 0 && msg.doc_id != expected {
            reject(&EditError::WrongDocument {
                expected,
                got: msg.doc_id,
            });
            return ControlFlow::Continue(());
        }

        self.dispatcher.dispatch(&self.session, msg)
    }
}

/// Routes accepted edits off the read loop.
enum Dispatcher {
    /// One task per edit.
    Concurrent,
    /// A per-connection FIFO worker behind a bounded queue.
    Ordered(mpsc::Sender<EditMessage>),
}

impl Dispatcher {
    fn start(sync: &SyncConfig, session: &Arc<DocumentSession>) -> Self {
        match sync.dispatch {
            DispatchMode::Concurrent => Self::Concurrent,
            DispatchMode::Ordered => {
                let (tx, mut rx) = mpsc::channel::<EditMessage>(sync.edit_queue.max(1));
                let session = Arc::clone(session);
                tokio::spawn(
                    async move {
                        // Drains what is queued even after the reader has gone.
                        while let Some(msg) = rx.recv().await {
                            let span = spans::edit(session.id(), msg.random_id);
                            process_edit(&session, msg).instrument(span).await;
                        }
                    }
                    .in_current_span(),
                );
                Self::Ordered(tx)
            }
        }
    }

    fn dispatch(
        &self,
        session: &Arc<DocumentSession>,
        msg: EditMessage,
    ) -> ControlFlow<TransportClosed> {
        match self {
            Self::Concurrent => {
                let session = Arc::clone(session);
                let span = spans::edit(session.id(), msg.random_id);
                tokio::spawn(async move { process_edit(&session, msg).await }.instrument(span));
            }
            Self::Ordered(queue) => match queue.try_send(msg) {
                Ok(()) => {}
                // Dropping one edit would break every later diff from this
                // client, so the client goes instead.
                Err(TrySendError::Full(_)) => {
                    return ControlFlow::Break(TransportClosed::EditBacklog);
                }
                Err(TrySendError::Closed(_)) => warn!("Edit worker stopped, dropping edit"),
            },
        }
        ControlFlow::Continue(())
    }
}

/// Apply one edit to the session and record its outcome.
async fn process_edit(session: &DocumentSession, msg: EditMessage) {
    let _timer = EditTimer::start();
    match session.apply_edit(&msg).await {
        Ok(EditCommit::Applied(delivery)) => {
            metrics::record_edit(EditOutcome::Applied);
            debug!(
                delivered = delivery.delivered,
                failed = delivery.failed,
                "Edit applied"
            );
        }
        Ok(EditCommit::Unchanged) => {
            metrics::record_edit(EditOutcome::Noop);
            debug!("Edit left document unchanged");
        }
        Err(e) => reject(&e),
    }
}

fn reject(err: &EditError) {
    metrics::record_edit(EditOutcome::Rejected);
    metrics::record_edit_error(err.error_code());
    warn!(code = err.error_code(), error = %err, "Edit rejected");
}
