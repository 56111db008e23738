//! Auth token persistence.
//!
//! The session lifecycle calls [`TokenStore::load`] on start-up,
//! [`TokenStore::save`] after login/refresh and [`TokenStore::clear`] on
//! logout. Nothing is persisted implicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;

/// Key the token is stored under.
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// On-disk shape of a persisted session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedAuth {
    pub token: Option<String>,
}

pub trait TokenStore {
    fn load(&self) -> Result<Option<String>, PersistError>;
    fn save(&self, token: &str) -> Result<(), PersistError>;
    fn clear(&self) -> Result<(), PersistError>;
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// Stores `<key>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
        }
    }

    /// `<config dir>/wold-client/auth-storage.json`.
    pub fn in_config_dir() -> Result<Self, PersistError> {
        let dir = dirs::config_dir().ok_or(PersistError::NoConfigDir)?;
        Ok(Self::new(dir.join("wold-client"), AUTH_STORAGE_KEY))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, PersistError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No saved session at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let auth: PersistedAuth = serde_json::from_str(&json)?;
        Ok(auth.token)
    }

    fn save(&self, token: &str) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let auth = PersistedAuth {
            token: Some(token.to_string()),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&auth)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store
            .slots
            .lock()
            .insert(AUTH_STORAGE_KEY.to_string(), token.to_string());
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, PersistError> {
        Ok(self.slots.lock().get(AUTH_STORAGE_KEY).cloned())
    }

    fn save(&self, token: &str) -> Result<(), PersistError> {
        self.slots
            .lock()
            .insert(AUTH_STORAGE_KEY.to_string(), token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistError> {
        self.slots.lock().remove(AUTH_STORAGE_KEY);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"), AUTH_STORAGE_KEY);

        assert_eq!(store.load().unwrap(), None);
        store.save("tok-1").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("tok-1"));
        assert!(store.path().ends_with("auth-storage.json"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path(), AUTH_STORAGE_KEY);
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(PersistError::Json(_))));
    }

    #[test]
    fn memory_store() {
        let store = MemoryTokenStore::with_token("abc");
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
