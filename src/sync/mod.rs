//! Real-time channel: transports and the bridge task that mirrors remote
//! presence into the [`Store`](crate::store::Store).

pub mod bridge;
pub mod memory;
pub mod transport;

pub use bridge::{BridgeEvent, SyncBridge, SyncConfig};
pub use memory::{MemoryConnection, MemoryConnector, MemoryListener, MemoryPeer};
pub use transport::{Connection, Connector, WsConnection, WsConnector};
