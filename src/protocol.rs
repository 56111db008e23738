//! Real-time channel event protocol.
//!
//! This module owns **every event that crosses the channel boundary** between
//! this client and the sync server. Payloads are untyped JSON on the wire;
//! they are validated here into closed variants and nothing untyped travels
//! further into the crate.
//!
//! ## Events
//!
//! | Event           | Direction       | Payload                          |
//! |-----------------|-----------------|----------------------------------|
//! | `user:join`     | server → client | user object                      |
//! | `user:leave`    | server → client | user id                          |
//! | `user:update`   | server → client | `{ userId, data }`               |
//! | `object:create` | both            | object                           |
//! | `object:remove` | both            | object id                        |
//! | `object:update` | server → client | `{ objectId, data }`             |
//! | `user:position` | client → server | `{ userId, position }`           |
//! | `user:rotation` | client → server | `{ userId, rotation }`           |
//! | `object:position` | client → server | `{ objectId, position }`       |
//! | `object:rotation` | client → server | `{ objectId, rotation }`       |
//!
//! Positions and rotations are `[x, y, z]` arrays.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::types::{EntityKind, EntityPatch, RemoteEntity, Vec3, IDENTITY_KEYS};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Every event name used by the channel protocol, as constants.
pub mod events {
    pub const USER_JOIN: &str = "user:join";
    pub const USER_LEAVE: &str = "user:leave";
    pub const USER_UPDATE: &str = "user:update";

    pub const OBJECT_CREATE: &str = "object:create";
    pub const OBJECT_REMOVE: &str = "object:remove";
    pub const OBJECT_UPDATE: &str = "object:update";

    pub const USER_POSITION: &str = "user:position";
    pub const USER_ROTATION: &str = "user:rotation";
    pub const OBJECT_POSITION: &str = "object:position";
    pub const OBJECT_ROTATION: &str = "object:rotation";
}

// ---------------------------------------------------------------------------
// Inbound (server → client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `user:join` / `object:create`.
    Joined {
        kind: EntityKind,
        entity: RemoteEntity,
    },
    /// `user:leave` / `object:remove`.
    Left { kind: EntityKind, id: String },
    /// `user:update` / `object:update`.
    Updated {
        kind: EntityKind,
        id: String,
        patch: EntityPatch,
    },
}

impl InboundEvent {
    /// Validate a raw `(event, data)` pair from the transport.
    pub fn decode(event: &str, data: Value) -> Result<Self, ProtocolError> {
        match event {
            events::USER_JOIN => Ok(Self::Joined {
                kind: EntityKind::User,
                entity: decode_entity(event, data)?,
            }),
            events::OBJECT_CREATE => Ok(Self::Joined {
                kind: EntityKind::Object,
                entity: decode_entity(event, data)?,
            }),
            events::USER_LEAVE => Ok(Self::Left {
                kind: EntityKind::User,
                id: decode_id(event, &data, "userId")?,
            }),
            events::OBJECT_REMOVE => Ok(Self::Left {
                kind: EntityKind::Object,
                id: decode_id(event, &data, "objectId")?,
            }),
            events::USER_UPDATE => {
                let (id, patch) = decode_update(event, data, "userId")?;
                Ok(Self::Updated {
                    kind: EntityKind::User,
                    id,
                    patch,
                })
            }
            events::OBJECT_UPDATE => {
                let (id, patch) = decode_update(event, data, "objectId")?;
                Ok(Self::Updated {
                    kind: EntityKind::Object,
                    id,
                    patch,
                })
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Joined { kind, .. } | Self::Left { kind, .. } | Self::Updated { kind, .. } => {
                *kind
            }
        }
    }
}

fn parse<T: DeserializeOwned>(event: &str, v: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(v).map_err(|e| ProtocolError::invalid(event, e.to_string()))
}

fn non_empty(event: &str, id: String) -> Result<String, ProtocolError> {
    if id.trim().is_empty() {
        Err(ProtocolError::invalid(event, "empty id"))
    } else {
        Ok(id)
    }
}

fn decode_entity(event: &str, data: Value) -> Result<RemoteEntity, ProtocolError> {
    let mut entity: RemoteEntity = parse(event, data)?;
    non_empty(event, entity.id.clone())?;
    entity.data.retain(|k, _| !IDENTITY_KEYS.contains(&k.as_str()));
    Ok(entity)
}

/// Ids arrive either bare (`"u1"`) or wrapped (`{"userId": "u1"}` / `{"id": "u1"}`).
fn decode_id(event: &str, data: &Value, key: &str) -> Result<String, ProtocolError> {
    let id = match data {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o
            .get(key)
            .or_else(|| o.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    let id = id.ok_or_else(|| ProtocolError::invalid(event, "expected an id"))?;
    non_empty(event, id)
}

fn decode_update(
    event: &str,
    data: Value,
    key: &str,
) -> Result<(String, EntityPatch), ProtocolError> {
    let Value::Object(mut o) = data else {
        return Err(ProtocolError::invalid(event, "expected an object"));
    };
    let patch = match o.remove("data") {
        Some(d @ Value::Object(_)) => parse::<EntityPatch>(event, d)?.without_identity(),
        Some(_) => return Err(ProtocolError::invalid(event, "'data' must be an object")),
        None => EntityPatch::default(),
    };
    let id = decode_id(event, &Value::Object(o), key)?;
    Ok((id, patch))
}

// ---------------------------------------------------------------------------
// Outbound (client → server)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    UserPosition { user_id: String, position: Vec3 },
    UserRotation { user_id: String, rotation: Vec3 },
    ObjectPosition { object_id: String, position: Vec3 },
    ObjectRotation { object_id: String, rotation: Vec3 },
    ObjectCreate(RemoteEntity),
    ObjectRemove { object_id: String },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserPosition { .. } => events::USER_POSITION,
            Self::UserRotation { .. } => events::USER_ROTATION,
            Self::ObjectPosition { .. } => events::OBJECT_POSITION,
            Self::ObjectRotation { .. } => events::OBJECT_ROTATION,
            Self::ObjectCreate(_) => events::OBJECT_CREATE,
            Self::ObjectRemove { .. } => events::OBJECT_REMOVE,
        }
    }

    /// JSON argument carried with the event.
    pub fn payload(&self) -> Value {
        match self {
            Self::UserPosition { user_id, position } => {
                json!({ "userId": user_id, "position": position })
            }
            Self::UserRotation { user_id, rotation } => {
                json!({ "userId": user_id, "rotation": rotation })
            }
            Self::ObjectPosition {
                object_id,
                position,
            } => json!({ "objectId": object_id, "position": position }),
            Self::ObjectRotation {
                object_id,
                rotation,
            } => json!({ "objectId": object_id, "rotation": rotation }),
            Self::ObjectCreate(entity) => json!(entity),
            Self::ObjectRemove { object_id } => json!(object_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
