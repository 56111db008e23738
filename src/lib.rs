//! Wold Virtual client core
//!
//! An observable application state store kept in step with a real-time
//! channel, plus the REST clients for scenes, assets and accounts.
//!
//! ## Architecture
//!
//! ```text
//! AppContext  (app.rs)             ← session lifecycle, content calls
//!   ├── Store  (store.rs)          ← AppState + subscribers
//!   │     └── Patch  (state.rs)    ← every mutation, applied atomically
//!   ├── HttpApi  (api/)            ← AuthApi + ContentApi over reqwest
//!   ├── TokenStore  (persist.rs)   ← "auth-storage" token
//!   └── SyncBridge  (sync/)        ← tokio task owning the transport
//!         ├── socketio.rs          ← Engine.IO / Socket.IO text frames
//!         └── protocol.rs → apply.rs → Store
//! ```
//!
//! The store, the patch model and the wire codecs have no async
//! dependencies and are always available. The bridge, HTTP client and
//! application context require the `net` feature. Remote users and scene
//! objects only enter or leave the store through the bridge.

// Always available (no net feature needed).
pub mod config;
pub mod error;
pub mod persist;
pub mod protocol;
pub mod socketio;
pub mod state;
pub mod store;
pub mod types;

// Networked modules require the `net` feature.
#[cfg(feature = "net")]
pub mod api;
#[cfg(feature = "net")]
pub(crate) mod apply;
#[cfg(feature = "net")]
pub mod app;
#[cfg(feature = "net")]
pub mod sync;

// Convenience re-exports (net only)
#[cfg(feature = "net")]
pub use api::{AuthApi, ContentApi, HttpApi, WalletSigner};
#[cfg(feature = "net")]
pub use app::AppContext;
#[cfg(feature = "net")]
pub use sync::{BridgeEvent, SyncBridge, SyncConfig};

pub use crate::config::ClientConfig;
pub use error::{ApiError, PersistError, ProtocolError, SyncError};
pub use persist::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use protocol::{InboundEvent, OutboundEvent};
pub use state::{AppState, Patch};
pub use store::{Store, Subscription};
pub use types::{ConnectionState, EntityKind, EntityPatch, RemoteEntity, Vec3};
