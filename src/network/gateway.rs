//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds a TCP socket, runs the WebSocket upgrade for every
//! client and spawns a Connection task for each successful one. The
//! upgrade callback enforces the origin allow-list and requires the
//! request to name a document; anything else gets a 302 redirect.

use crate::config::{ListenConfig, SyncConfig};
use crate::network::Connection;
use crate::state::{ConnectionIdGenerator, DocumentStore};
use http::header::{LOCATION, ORIGIN};
use http::{HeaderValue, StatusCode};
use mdsync_proto::DocTarget;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, instrument, warn};

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    listen: Arc<ListenConfig>,
    sync: SyncConfig,
    store: Arc<DocumentStore>,
    ids: Arc<ConnectionIdGenerator>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        listen: ListenConfig,
        sync: SyncConfig,
        store: Arc<DocumentStore>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");

        Ok(Self {
            listener,
            listen: Arc::new(listen),
            sync,
            store,
            ids: Arc::new(ConnectionIdGenerator::new()),
        })
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "WebSocket connection attempt");

                    let listen = Arc::clone(&self.listen);
                    let store = Arc::clone(&self.store);
                    let sync = self.sync.clone();
                    let id = self.ids.next();

                    tokio::spawn(async move {
                        let Some((ws_stream, target)) = upgrade(stream, addr, &listen).await else {
                            return;
                        };
                        info!(conn = %id, %addr, doc_id = target.id, "WebSocket handshake successful");

                        let connection = Connection::new(id, addr, target, ws_stream, store, sync);
                        if let Err(e) = connection.run().await {
                            error!(conn = %id, %addr, error = %e, "WebSocket connection error");
                        }
                        info!(conn = %id, %addr, "WebSocket connection closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

/// Perform the WebSocket handshake, validating origin and document target.
async fn upgrade(
    stream: TcpStream,
    addr: SocketAddr,
    listen: &ListenConfig,
) -> Option<(tokio_tungstenite::WebSocketStream<TcpStream>, DocTarget)> {
    let mut target = None;

    let callback = |req: &Request, response: Response| {
        let origin = req.headers().get(ORIGIN).and_then(|o| o.to_str().ok());
        if !listen.origin_allowed(origin) {
            warn!(%addr, origin = ?origin, "WebSocket origin rejected");
            return Err(forbidden());
        }

        match DocTarget::from_query(req.uri().query()) {
            Ok(parsed) => {
                target = Some(parsed);
                Ok(response)
            }
            Err(e) => {
                info!(%addr, reason = %e, "Upgrade names no valid document, redirecting");
                Err(redirect(&listen.redirect_location))
            }
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;
    match handshake {
        Ok(ws_stream) => target.map(|target| (ws_stream, target)),
        Err(e) => {
            debug!(%addr, error = %e, "WebSocket handshake failed");
            None
        }
    }
}

fn forbidden() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("origin not allowed".to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

fn redirect(location: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(None);
    *response.status_mut() = StatusCode::FOUND;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(e) => warn!(location = %location, error = %e, "Redirect location is not a valid header value"),
    }
    response
}
