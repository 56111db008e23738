//! Transport abstraction for channel text frames.
//!
//! Implementations:
//! - [`WsConnector`]: WebSocket via `tokio-tungstenite`
//! - [`MemoryConnector`](super::memory::MemoryConnector): in-proc channels,
//!   the test harness plays the server

use std::future::Future;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::SyncError;
use crate::socketio;

/// One open transport carrying text frames.
pub trait Connection: Send + 'static {
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Next text frame; `None` once the peer closed the transport.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, SyncError>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens [`Connection`]s. Called once per handshake attempt.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self) -> impl Future<Output = Result<Self::Conn, SyncError>> + Send;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// `base` is the channel base URL (`ws://host:port`); the Socket.IO path
    /// is appended.
    pub fn new(base: &str) -> Self {
        Self {
            url: socketio::websocket_url(base),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    type Conn = WsConnection;

    async fn connect(&self) -> Result<WsConnection, SyncError> {
        log::debug!("[sync] opening {}", self.url);
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Connect(e.to_string()))?;
        Ok(WsConnection { stream })
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<(), SyncError> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    log::debug!("[sync] close frame: {frame:?}");
                    return None;
                }
                // WebSocket-level ping/pong is answered by tungstenite;
                // binary frames are not part of the protocol.
                Ok(_) => continue,
                Err(e) => return Some(Err(SyncError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("[sync] close: {e}");
        }
    }
}
