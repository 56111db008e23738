//! Core client types shared across all modules.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

/// Three floats, carried on the wire as a `[x, y, z]` array.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Wallet address (`0x` + 40 hex digits).
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `PUT /users/:address`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Lighting {
    pub ambient: Vec3,
    pub directional: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Vec3::splat(1.0),
            directional: Vec3::splat(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Physics {
    pub gravity: f32,
    pub friction: f32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            gravity: -9.81,
            friction: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneSettings {
    pub environment: String,
    #[serde(default)]
    pub lighting: Lighting,
    #[serde(default)]
    pub physics: Physics,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.into(),
            lighting: Lighting::default(),
            physics: Physics::default(),
        }
    }
}

/// Environment preset active before any scene is loaded.
pub const DEFAULT_ENVIRONMENT: &str = "sunset";

/// Scene body, also the payload of `POST /scenes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SceneData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objects: Vec<RemoteEntity>,
    #[serde(default)]
    pub settings: SceneSettings,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub data: SceneData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Model,
    Texture,
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub format: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipfs_hash: Option<String>,
    pub metadata: AssetMetadata,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `POST /assets`. The content hash comes from the storage gateway,
/// which lives outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetDraft {
    pub metadata: AssetMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfs_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
    First,
    #[default]
    Third,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerControls {
    pub enabled: bool,
    pub locked: bool,
}

impl Default for PlayerControls {
    fn default() -> Self {
        Self {
            enabled: true,
            locked: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    /// How long the UI should keep it visible. `None` means until dismissed.
    pub duration: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Remote entities
// ---------------------------------------------------------------------------

/// Which mapping a remote entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Object,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::User => f.write_str("user"),
            EntityKind::Object => f.write_str("object"),
        }
    }
}

/// Keys that name an entity rather than describe it. They never enter an
/// entity's `data`.
pub const IDENTITY_KEYS: [&str; 3] = ["id", "userId", "objectId"];

/// A user or shared object mirrored from the real-time channel.
///
/// Every JSON key other than `id`, `position` and `rotation` is kept in
/// `data`, so scene objects (`type`, `scale`, `owner`...) round-trip intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RemoteEntity {
    pub id: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl RemoteEntity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Merge `patch` field by field; later writes win. Identity keys in
    /// the patch are ignored, the id never changes.
    pub fn merge(&mut self, patch: EntityPatch) {
        if let Some(p) = patch.position {
            self.position = p;
        }
        if let Some(r) = patch.rotation {
            self.rotation = r;
        }
        for (k, v) in patch.data {
            if !IDENTITY_KEYS.contains(&k.as_str()) {
                self.data.insert(k, v);
            }
        }
    }

    /// The whole entity expressed as a patch, used when a duplicate join is
    /// folded into an existing entry.
    pub fn into_patch(self) -> EntityPatch {
        EntityPatch {
            position: Some(self.position),
            rotation: Some(self.rotation),
            data: self.data,
        }
    }
}

/// Partial update for a [`RemoteEntity`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl EntityPatch {
    /// Drop identity keys from `data`.
    pub fn without_identity(mut self) -> Self {
        self.data.retain(|k, _| !IDENTITY_KEYS.contains(&k.as_str()));
        self
    }

    pub fn position(p: Vec3) -> Self {
        Self {
            position: Some(p),
            ..Default::default()
        }
    }

    pub fn rotation(r: Vec3) -> Self {
        Self {
            rotation: Some(r),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Sync bridge lifecycle:
/// `disconnected → connecting → connected → (reconnecting ⇄ connected) → disconnected`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}
