//! Store integration tests: patches, subscribers and the sync apply path

#[cfg(all(test, feature = "net"))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use serde_json::{json, Value};
    use wold_client::{
        protocol::events,
        state::{fold, AppState, Patch, PlayerPatch, RemoteChange, UiPatch},
        types::{Lighting, PlayerControls, PlayerMode, Severity},
        BridgeEvent, ConnectionState, EntityKind, EntityPatch, InboundEvent, RemoteEntity, Store,
        Vec3,
    };

    /// Deliver one channel event the way the bridge does.
    fn feed(store: &mut Store, event: &str, data: Value) {
        BridgeEvent::Inbound(InboundEvent::decode(event, data).unwrap()).apply_to(store);
    }

    // -----------------------------------------------------------------------
    // Initial values and reset
    // -----------------------------------------------------------------------

    fn assert_initial(state: &AppState) {
        assert_eq!(state.scene.environment, "sunset");
        assert_eq!(state.scene.lighting, Lighting::default());
        assert_eq!(state.player.position, Vec3::new(0.0, 2.0, 5.0));
        assert_eq!(state.player.rotation, Vec3::zero());
        assert_eq!(state.player.scale, Vec3::splat(1.0));
        assert_eq!(state.player.mode, PlayerMode::Third);
        assert_eq!(state.player.controls, PlayerControls::default());
        assert!(state.player.controls.enabled);
        assert!(!state.session.is_authenticated);
        assert!(!state.ui.show_login && !state.ui.show_chat);
        assert!(state.ui.notifications.is_empty());
        assert!(state.scene.objects.is_empty());
        assert!(state.presence.users.is_empty());
        assert_eq!(state.presence.connection, ConnectionState::Disconnected);
    }

    #[test]
    fn reset_restores_every_initial_value_in_one_mutation() {
        let mut store = Store::new();
        assert_initial(store.state());

        store.set_player_mode(PlayerMode::First);
        store.set_environment("night");
        store.set_show_inventory(true);
        store.add_notification(Severity::Warning, "low health", Some(Duration::from_secs(3)));
        feed(&mut store, events::OBJECT_CREATE, json!({"id": "a"}));

        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let _sub = store.subscribe(move |_| *h.borrow_mut() += 1);

        store.reset();
        assert_eq!(*hits.borrow(), 1);
        assert_initial(store.state());
    }

    // -----------------------------------------------------------------------
    // Fold property
    // -----------------------------------------------------------------------

    #[test]
    fn store_equals_fold_over_local_patches() {
        let patches = vec![
            Patch::Ui(UiPatch {
                show_settings: Some(true),
                ..Default::default()
            }),
            Patch::Scene(wold_client::state::ScenePatch {
                environment: Some("night".into()),
                ..Default::default()
            }),
            Patch::MoveObject {
                id: "ghost".into(),
                patch: EntityPatch::position(Vec3::zero()),
            },
            Patch::Player(PlayerPatch {
                scale: Some(Vec3::splat(2.0)),
                ..Default::default()
            }),
        ];

        let mut store = Store::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _sub = store.subscribe(move |st| s.borrow_mut().push(st.clone()));

        for p in patches.clone() {
            store.dispatch(p);
        }

        let expected = fold(patches);
        assert_eq!(*store.state(), expected);
        // The ghost move did not notify.
        assert_eq!(seen.borrow().len(), 3);
        assert_eq!(seen.borrow().last(), Some(&expected));
    }

    #[test]
    fn remote_changes_only_enter_through_the_bridge() {
        let mut store = Store::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let _sub = store.subscribe(move |_| *h.borrow_mut() += 1);

        store.dispatch(Patch::Remote(RemoteChange::Joined {
            kind: EntityKind::Object,
            entity: RemoteEntity::new("ghost"),
        }));
        assert!(store.state().scene.objects.is_empty());
        assert_eq!(*hits.borrow(), 0);

        feed(&mut store, events::OBJECT_CREATE, json!({"id": "box"}));
        assert!(store.state().scene.objects.contains_key("box"));
        assert_eq!(*hits.borrow(), 1);
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    #[test]
    fn cancelled_subscriber_hears_nothing_more() {
        let mut store = Store::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        let sub = store.subscribe(move |_| *h.borrow_mut() += 1);

        store.set_show_chat(true);
        sub.cancel();
        store.set_show_chat(false);
        store.set_player_position(Vec3::splat(9.0));
        store.reset();

        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn presence_slice_subscriber_tracks_joins_and_leaves() {
        let mut store = Store::new();
        let counts = Rc::new(RefCell::new(Vec::new()));
        let c = counts.clone();
        let _sub = store.subscribe_slice(
            |s| s.presence.users.len(),
            move |n| c.borrow_mut().push(*n),
        );

        feed(&mut store, events::USER_JOIN, json!({"id": "u1"}));
        feed(&mut store, events::USER_JOIN, json!({"id": "u2"}));
        feed(
            &mut store,
            events::USER_UPDATE,
            json!({"userId": "u1", "data": {"position": [1, 1, 1]}}),
        );
        feed(&mut store, events::USER_LEAVE, json!({"userId": "u1"}));

        assert_eq!(*counts.borrow(), vec![1, 2, 1]);
    }

    // -----------------------------------------------------------------------
    // Sync apply path
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_join_merges_last_write_wins() {
        let mut store = Store::new();
        feed(
            &mut store,
            events::USER_JOIN,
            json!({"id": "u1", "position": [1, 0, 0], "name": "ada"}),
        );
        feed(
            &mut store,
            events::USER_JOIN,
            json!({"id": "u1", "position": [2, 0, 0], "avatar": "fox"}),
        );

        let users = &store.state().presence.users;
        assert_eq!(users.len(), 1);
        assert_eq!(users["u1"].position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(users["u1"].data["name"], "ada");
        assert_eq!(users["u1"].data["avatar"], "fox");
    }

    #[test]
    fn disconnect_forgets_users_but_keeps_scene_objects() {
        let mut store = Store::new();
        feed(&mut store, events::USER_JOIN, json!({"id": "u1"}));
        feed(&mut store, events::OBJECT_CREATE, json!({"id": "o1"}));
        BridgeEvent::State(ConnectionState::Connected).apply_to(&mut store);

        BridgeEvent::State(ConnectionState::Disconnected).apply_to(&mut store);

        assert!(store.state().presence.users.is_empty());
        assert_eq!(store.state().scene.objects.len(), 1);
    }

    #[test]
    fn notifications_are_fifo_and_dismissable() {
        let mut store = Store::new();
        let a = store.add_notification(Severity::Info, "first", None);
        let b = store.add_notification(Severity::Success, "second", None);
        let c = store.add_notification(Severity::Error, "third", None);

        store.remove_notification(&b);
        let ids: Vec<_> = store
            .state()
            .ui
            .notifications
            .iter()
            .map(|n| n.id.clone())
            .collect();
        assert_eq!(ids, vec![a, c]);
    }
}
