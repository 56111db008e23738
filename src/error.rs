//! Error types, one enum per layer.
//!
//! Nothing in this crate surfaces these to the [`Store`](crate::store::Store)
//! as a panic: the application context converts every failure into the
//! session error slot plus an `error` notification.

use thiserror::Error;

/// A frame or event payload that failed validation at the channel boundary.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload for '{event}': {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl ProtocolError {
    pub(crate) fn invalid(event: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of the real-time channel transport.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("could not open transport: {0}")]
    Connect(String),

    #[error("server rejected connection: {0}")]
    Rejected(String),

    #[error("handshake timed out")]
    Timeout,

    #[error("transport closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Failures of the REST clients and the wallet signer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Input rejected before any network call.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("wallet error: {0}")]
    Wallet(String),
}

#[cfg(feature = "net")]
impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Failures reading or writing the persisted auth token.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no platform config directory available")]
    NoConfigDir,

    #[error("token storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("token storage format: {0}")]
    Json(#[from] serde_json::Error),
}
