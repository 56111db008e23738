//! Client configuration.
//!
//! Sources, later ones winning:
//!
//! | Source                    | Example                               |
//! |---------------------------|---------------------------------------|
//! | built-in defaults         | see [`ClientConfig::default`]         |
//! | `wold-client.toml`        | `api_url = "https://api.example"`     |
//! | `WOLD_*` environment      | `WOLD_WS_URL=ws://localhost:3001`     |
//!
//! The binary applies its command-line flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Base name of the optional config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "wold-client";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base URL.
    pub api_url: String,
    /// Real-time channel base URL.
    pub ws_url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub handshake_timeout_ms: u64,
    pub event_buffer: usize,
    pub outbound_buffer: usize,
    /// Directory for the persisted auth token; the platform config
    /// directory when unset.
    pub token_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            ws_url: "ws://localhost:3001".into(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            handshake_timeout_ms: 10_000,
            event_buffer: 1024,
            outbound_buffer: 64,
            token_dir: None,
        }
    }
}

impl ClientConfig {
    /// Layer `file` (or `wold-client.toml` when `None`) and the `WOLD_*`
    /// environment over the defaults. A missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("WOLD"))
            .build()?
            .try_deserialize()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Bridge settings carrying `token` as the connect credential.
    #[cfg(feature = "net")]
    pub fn sync_config(&self, token: Option<String>) -> crate::sync::SyncConfig {
        crate::sync::SyncConfig {
            token,
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay: self.reconnect_delay(),
            handshake_timeout: self.handshake_timeout(),
            event_buffer: self.event_buffer,
            outbound_buffer: self.outbound_buffer,
        }
    }
}
