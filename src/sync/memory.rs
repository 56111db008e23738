//! In-process transport. The connecting side is a [`Connector`]; every
//! connection it opens shows up on the [`MemoryListener`] as a
//! [`MemoryPeer`] that plays the server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::transport::{Connection, Connector};
use crate::error::SyncError;
use crate::socketio;

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept: Option<mpsc::UnboundedSender<MemoryPeer>>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Connector whose connections are accepted on the returned listener.
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                accept: Some(tx),
                attempts: Arc::default(),
            },
            MemoryListener { incoming: rx },
        )
    }

    /// Connector that refuses every attempt.
    pub fn refusing() -> Self {
        Self {
            accept: None,
            attempts: Arc::default(),
        }
    }

    /// Shared counter of `connect` calls.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = self
            .accept
            .as_ref()
            .ok_or_else(|| SyncError::Connect("connection refused".into()))?;

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        accept
            .send(MemoryPeer {
                tx: to_client,
                rx: from_client,
            })
            .map_err(|_| SyncError::Connect("listener gone".into()))?;

        Ok(MemoryConnection {
            tx: Some(to_server),
            rx: from_server,
        })
    }
}

pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Client side of an in-process connection.
pub struct MemoryConnection {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Connection for MemoryConnection {
    async fn send(&mut self, frame: String) -> Result<(), SyncError> {
        let tx = self.tx.as_ref().ok_or(SyncError::Closed)?;
        tx.send(frame).map_err(|_| SyncError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}

/// Server side of an in-process connection.
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Push a raw frame to the client. Returns `false` if it hung up.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    /// Next raw frame from the client; `None` once it closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Send a `42["event",data]` frame.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.send(socketio::event_frame(event, &data))
    }

    /// Play the server half of the handshake: send the open packet, wait for
    /// the client's `CONNECT` and acknowledge it. Returns the client's
    /// `CONNECT` frame.
    pub async fn accept_handshake(&mut self) -> Option<String> {
        let open = json!({
            "sid": "mem",
            "upgrades": [],
            "pingInterval": 25000,
            "pingTimeout": 20000,
        });
        self.send(format!("0{open}"));
        let connect = self.recv().await?;
        if !connect.starts_with("40") {
            return None;
        }
        self.send(r#"40{"sid":"mem-ns"}"#);
        Some(connect)
    }
}
