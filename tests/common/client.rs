//! Test WebSocket client.
//!
//! Sends edit messages for one document and asserts on broadcasts.

use futures_util::{SinkExt, StreamExt};
use mdsync_proto::{Diff, EditMessage};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test client bound to one document.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    doc_id: i64,
}

impl TestClient {
    /// Connect to a test server upgrade URL.
    pub async fn connect(url: &str, doc_id: i64) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws, doc_id })
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send an edit message.
    pub async fn send(&mut self, msg: &EditMessage) -> anyhow::Result<()> {
        self.send_raw(&msg.encode()?).await
    }

    /// Build an edit for this client's document.
    pub fn edit(&self, name: &str, diffs: Vec<Diff>, random_id: i64) -> EditMessage {
        EditMessage {
            diffs,
            name: name.to_string(),
            doc_id: self.doc_id,
            opt: 1,
            random_id,
            ..Default::default()
        }
    }

    /// Receive a single broadcast from the server.
    pub async fn recv(&mut self) -> anyhow::Result<EditMessage> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a broadcast with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<EditMessage> {
        loop {
            match timeout(dur, self.ws.next()).await? {
                Some(Ok(Message::Text(text))) => return Ok(EditMessage::decode_str(&text)?),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("connection closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Assert nothing arrives within `dur`.
    pub async fn expect_silence(&mut self, dur: Duration) {
        if let Ok(msg) = self.recv_timeout(dur).await {
            panic!("expected no broadcast, got {msg:?}");
        }
    }

    /// Whether the server has closed the connection within `dur`.
    pub async fn closed_within(&mut self, dur: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + dur;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => return false,
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }
}
