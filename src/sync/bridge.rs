//! Sync bridge: one logical connection to the real-time channel.
//!
//! ## Threading model
//!
//! ```text
//! application thread                 │  bridge task (tokio)
//! ────────────────────────────────── │ ─────────────────────────────────
//! SyncBridge::poll()/next_event()    │ run_bridge()
//!   ← events.recv()                  │   handshake → State(Connected)
//!   → BridgeEvent::apply_to(store)   │   recv frame → InboundEvent
//!                                    │   → events.send(Inbound(..))
//! SyncBridge::emit(..)               │
//!   → outbound.try_send(..)          │   outbound.recv() → 42[...] frame
//! SyncBridge::cleanup()/shutdown()   │
//!   → shutdown.send(())              │   41 frame, close, State(Disconnected)
//! ```
//!
//! The task owns the transport; the store never leaves the application
//! thread. Connection state changes travel on the same channel as inbound
//! events so their relative order is preserved.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::transport::{Connection, Connector};
use crate::apply;
use crate::error::SyncError;
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::socketio::{self, Packet};
use crate::store::Store;
use crate::types::{ConnectionState, RemoteEntity, Vec3};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bearer token sent with the Socket.IO `CONNECT`.
    pub token: Option<String>,
    /// Consecutive failed handshakes before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
    pub handshake_timeout: Duration,
    /// Inbound events buffered before the task waits for the application.
    pub event_buffer: usize,
    /// Outbound emits buffered before new ones are dropped.
    pub outbound_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            token: None,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            handshake_timeout: Duration::from_secs(10),
            event_buffer: 1024,
            outbound_buffer: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Events delivered to the application thread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    State(ConnectionState),
    Inbound(InboundEvent),
}

impl BridgeEvent {
    /// Mirror this event into `store`.
    pub fn apply_to(self, store: &mut Store) {
        match self {
            BridgeEvent::State(state) => {
                apply::set_connection(store, state);
                if state == ConnectionState::Disconnected {
                    apply::clear_presence(store);
                }
            }
            BridgeEvent::Inbound(ev) => apply::apply_inbound(store, ev),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owned by the application context. Dropping it without
/// [`cleanup`](Self::cleanup) aborts the bridge task.
pub struct SyncBridge {
    events: mpsc::Receiver<BridgeEvent>,
    outbound: mpsc::Sender<OutboundEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    state: ConnectionState,
    closed: bool,
}

impl SyncBridge {
    /// Spawn the bridge task and start connecting. Must be called from
    /// within a tokio runtime.
    pub fn initialize<C: Connector>(config: SyncConfig, connector: C) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // `log` records from the task are attributed to this span once a
        // tracing subscriber bridges them.
        let span = tracing::info_span!("sync_bridge", token = config.token.is_some());
        let task = tokio::spawn(
            run_bridge(connector, config, event_tx, outbound_rx, shutdown_rx).instrument(span),
        );

        Self {
            events: event_rx,
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            task,
            state: ConnectionState::Connecting,
            closed: false,
        }
    }

    /// Last connection state delivered through this handle.
    pub fn state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True while the bridge task is still running.
    pub fn is_alive(&self) -> bool {
        !self.closed && !self.task.is_finished()
    }

    /// Wait for the next event. `None` once the bridge task has exited and
    /// every event was delivered.
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        let ev = self.events.recv().await?;
        self.observe(&ev);
        Some(ev)
    }

    /// Drain every pending event without waiting.
    pub fn poll(&mut self) -> Vec<BridgeEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            self.observe(&ev);
            out.push(ev);
        }
        out
    }

    fn observe(&mut self, ev: &BridgeEvent) {
        if let BridgeEvent::State(s) = ev {
            self.state = *s;
        }
    }

    // -----------------------------------------------------------------------
    // Outbound (fire-and-forget)
    // -----------------------------------------------------------------------

    /// Queue `event` for sending. At most once, never retried; a no-op after
    /// [`cleanup`](Self::cleanup).
    pub fn emit(&self, event: OutboundEvent) {
        if self.closed {
            return;
        }
        match self.outbound.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                log::warn!("[sync] outbound queue full, dropping {}", ev.name());
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                log::debug!("[sync] bridge stopped, dropping {}", ev.name());
            }
        }
    }

    pub fn update_user_position(&self, user_id: &str, position: Vec3) {
        self.emit(OutboundEvent::UserPosition {
            user_id: user_id.into(),
            position,
        });
    }

    pub fn update_user_rotation(&self, user_id: &str, rotation: Vec3) {
        self.emit(OutboundEvent::UserRotation {
            user_id: user_id.into(),
            rotation,
        });
    }

    pub fn update_object_position(&self, object_id: &str, position: Vec3) {
        self.emit(OutboundEvent::ObjectPosition {
            object_id: object_id.into(),
            position,
        });
    }

    pub fn update_object_rotation(&self, object_id: &str, rotation: Vec3) {
        self.emit(OutboundEvent::ObjectRotation {
            object_id: object_id.into(),
            rotation,
        });
    }

    pub fn create_object(&self, object: RemoteEntity) {
        self.emit(OutboundEvent::ObjectCreate(object));
    }

    pub fn remove_object(&self, object_id: &str) {
        self.emit(OutboundEvent::ObjectRemove {
            object_id: object_id.into(),
        });
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the transport and mark the bridge disconnected. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.closed = true;
        self.state = ConnectionState::Disconnected;
    }

    /// [`cleanup`](Self::cleanup), then wait up to `grace` for the task to
    /// send its disconnect frame and exit. Pending events are discarded
    /// meanwhile so a full event buffer cannot stall the task. Returns
    /// `false` if the task had to be aborted.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.cleanup();
        let events = &mut self.events;
        let task = &mut self.task;
        let finished = tokio::time::timeout(grace, async move {
            while events.recv().await.is_some() {}
            let _ = task.await;
        })
        .await
        .is_ok();
        if !finished {
            self.task.abort();
        }
        finished
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        // After cleanup the task is already sending its disconnect frame.
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Bridge task
// ---------------------------------------------------------------------------

enum SessionEnd {
    /// Cleanup requested or the handle went away.
    Shutdown,
    Lost(SyncError),
}

async fn run_bridge<C: Connector>(
    connector: C,
    config: SyncConfig,
    events: mpsc::Sender<BridgeEvent>,
    mut outbound: mpsc::Receiver<OutboundEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut failures: u32 = 0;
    let mut state = ConnectionState::Connecting;

    loop {
        if events.send(BridgeEvent::State(state)).await.is_err() {
            return;
        }

        let attempt = tokio::select! {
            _ = &mut shutdown => break,
            r = tokio::time::timeout(
                config.handshake_timeout,
                handshake(&connector, config.token.as_deref()),
            ) => r.unwrap_or_else(|_| Err(SyncError::Timeout)),
        };

        match attempt {
            Ok(conn) => {
                failures = 0;
                log::info!("[sync] connected");
                if events
                    .send(BridgeEvent::State(ConnectionState::Connected))
                    .await
                    .is_err()
                {
                    return;
                }
                match run_session(conn, &events, &mut outbound, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(e) => log::warn!("[sync] connection lost: {e}"),
                }
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "[sync] handshake failed ({}/{}): {}",
                    failures,
                    config.max_reconnect_attempts,
                    e
                );
                if failures >= config.max_reconnect_attempts {
                    log::error!("[sync] giving up after {failures} failed attempts");
                    break;
                }
            }
        }

        state = ConnectionState::Reconnecting;
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    let _ = events
        .send(BridgeEvent::State(ConnectionState::Disconnected))
        .await;
    log::info!("[sync] bridge loop exited");
}

/// Open a transport and complete the Engine.IO/Socket.IO handshake.
async fn handshake<C: Connector>(connector: &C, token: Option<&str>) -> Result<C::Conn, SyncError> {
    let mut conn = connector.connect().await?;
    let mut sent_connect = false;

    loop {
        let frame = match conn.recv().await {
            Some(frame) => frame?,
            None => return Err(SyncError::Closed),
        };
        match socketio::parse_frame(&frame)? {
            Packet::Open { .. } if !sent_connect => {
                conn.send(socketio::connect_frame(token)).await?;
                sent_connect = true;
            }
            Packet::Ping => conn.send(socketio::pong_frame()).await?,
            Packet::Connect { sid } if sent_connect => {
                log::debug!("[sync] namespace connected (sid={sid:?})");
                return Ok(conn);
            }
            Packet::ConnectError { message } => return Err(SyncError::Rejected(message)),
            Packet::Close | Packet::Disconnect => return Err(SyncError::Closed),
            other => log::debug!("[sync] ignoring {other:?} during handshake"),
        }
    }
}

/// Pump one established connection until it drops or shutdown is requested.
async fn run_session<T: Connection>(
    mut conn: T,
    events: &mpsc::Sender<BridgeEvent>,
    outbound: &mut mpsc::Receiver<OutboundEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;

            _ = &mut *shutdown => {
                let _ = conn.send(socketio::disconnect_frame()).await;
                conn.close().await;
                return SessionEnd::Shutdown;
            }

            frame = conn.recv() => {
                let frame = match frame {
                    Some(Ok(f)) => f,
                    Some(Err(e)) => return SessionEnd::Lost(e),
                    None => return SessionEnd::Lost(SyncError::Closed),
                };
                match socketio::parse_frame(&frame) {
                    Ok(Packet::Ping) => {
                        if let Err(e) = conn.send(socketio::pong_frame()).await {
                            return SessionEnd::Lost(e);
                        }
                    }
                    Ok(Packet::Event { name, data }) => match InboundEvent::decode(&name, data) {
                        Ok(ev) => {
                            if events.send(BridgeEvent::Inbound(ev)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => log::warn!("[sync] dropping '{name}': {e}"),
                    },
                    Ok(Packet::Disconnect) | Ok(Packet::Close) => {
                        return SessionEnd::Lost(SyncError::Closed);
                    }
                    Ok(other) => log::debug!("[sync] ignoring {other:?}"),
                    Err(e) => log::warn!("[sync] bad frame: {e}"),
                }
            }

            out = outbound.recv() => {
                let Some(ev) = out else {
                    return SessionEnd::Shutdown;
                };
                let frame = socketio::event_frame(ev.name(), &ev.payload());
                if let Err(e) = conn.send(frame).await {
                    return SessionEnd::Lost(e);
                }
            }
        }
    }
}
