//! Mirror decoded channel events into the [`Store`].
//!
//! This is the only path that inserts or removes remote entities. Ordering
//! anomalies are normalized here rather than surfaced:
//!
//! - a duplicate join merges into the existing entity;
//! - a leave for an unknown id does nothing;
//! - an update for an unknown id is dropped (no implicit creation).

use crate::protocol::InboundEvent;
use crate::state::RemoteChange;
use crate::store::Store;
use crate::types::ConnectionState;

/// Apply one validated inbound event.
pub(crate) fn apply_inbound(store: &mut Store, event: InboundEvent) {
    let change = match event {
        InboundEvent::Joined { kind, entity } => RemoteChange::Joined { kind, entity },
        InboundEvent::Left { kind, id } => RemoteChange::Left { kind, id },
        InboundEvent::Updated { kind, id, patch } => RemoteChange::Updated { kind, id, patch },
    };
    store.apply_remote(change);
}

/// Mirror the bridge's connection state into the presence slice.
pub(crate) fn set_connection(store: &mut Store, state: ConnectionState) {
    store.apply_remote(RemoteChange::Connection(state));
}

/// Forget all remote users, used when the channel is torn down.
pub(crate) fn clear_presence(store: &mut Store) {
    store.apply_remote(RemoteChange::ClearPresence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::events;
    use crate::types::Vec3;
    use serde_json::{json, Value};

    /// Validate a raw `(event, data)` pair and apply it.
    fn apply_raw(store: &mut Store, event: &str, data: Value) -> Result<(), ProtocolError> {
        let ev = InboundEvent::decode(event, data)?;
        apply_inbound(store, ev);
        Ok(())
    }

    #[test]
    fn object_lifecycle() {
        let mut store = Store::new();
        assert!(store.state().scene.objects.is_empty());

        apply_raw(
            &mut store,
            events::OBJECT_CREATE,
            json!({"id": "a", "position": [0, 0, 0]}),
        )
        .unwrap();
        assert_eq!(store.state().scene.objects.len(), 1);

        apply_raw(
            &mut store,
            events::OBJECT_UPDATE,
            json!({"objectId": "a", "data": {"position": [1, 0, 0]}}),
        )
        .unwrap();
        assert_eq!(
            store.state().scene.objects["a"].position,
            Vec3::new(1.0, 0.0, 0.0)
        );

        apply_raw(&mut store, events::OBJECT_REMOVE, json!("a")).unwrap();
        assert!(store.state().scene.objects.is_empty());
    }

    #[test]
    fn update_before_join_creates_nothing() {
        let mut store = Store::new();
        apply_raw(
            &mut store,
            events::USER_UPDATE,
            json!({"userId": "late", "data": {"position": [5, 5, 5]}}),
        )
        .unwrap();
        assert!(store.state().presence.users.is_empty());
    }

    #[test]
    fn leave_of_unknown_user_is_noop() {
        let mut store = Store::new();
        apply_raw(&mut store, events::USER_LEAVE, json!("nobody")).unwrap();
        assert_eq!(*store.state(), crate::state::AppState::default());
    }

    #[test]
    fn invalid_payload_leaves_store_untouched() {
        let mut store = Store::new();
        let before = store.snapshot();
        assert!(apply_raw(&mut store, events::OBJECT_CREATE, json!({"position": 1})).is_err());
        assert_eq!(*store.state(), before);
    }

    #[test]
    fn connection_state_is_mirrored() {
        let mut store = Store::new();
        set_connection(&mut store, ConnectionState::Connecting);
        assert_eq!(store.state().presence.connection, ConnectionState::Connecting);
    }
}
