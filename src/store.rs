//! `Store`: the single observable holder of [`AppState`].
//!
//! Lives on one logical thread (the subscriber registry is `Rc<RefCell<…>>`),
//! so no locking is needed: every mutator runs to completion, including the
//! synchronous notification of subscribers, before the next one can start.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::state::{
    AppState, Patch, PlayerPatch, RemoteChange, ScenePatch, SessionPatch, UiPatch,
};
use crate::types::{
    Asset, EntityPatch, Lighting, Notification, PlayerControls, PlayerMode, Scene,
    Severity, User, Vec3,
};

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnMut(&AppState)>;

struct Entry {
    active: Rc<Cell<bool>>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    fn prune(&mut self) {
        self.entries.retain(|e| e.active.get());
    }
}

/// Cancellation handle returned by [`Store::subscribe`].
///
/// Dropping the handle does **not** unsubscribe; call [`Subscription::cancel`]
/// when the consumer goes away.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    active: Rc<Cell<bool>>,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Stop receiving notifications. Takes effect before the next
    /// notification cycle, even when called from inside a callback.
    pub fn cancel(&self) {
        self.active.set(false);
        if let Some(reg) = self.registry.upgrade() {
            // Busy while a notification cycle runs; the cycle prunes instead.
            if let Ok(mut reg) = reg.try_borrow_mut() {
                reg.prune();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct Store {
    state: AppState,
    registry: Rc<RefCell<Registry>>,
    next_notification: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_state(AppState::default())
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            state,
            registry: Rc::new(RefCell::new(Registry::default())),
            next_notification: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn snapshot(&self) -> AppState {
        self.state.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .borrow()
            .entries
            .iter()
            .filter(|e| e.active.get())
            .count()
    }

    // -----------------------------------------------------------------------
    // Subscribing
    // -----------------------------------------------------------------------

    /// Call `callback` with the new state after every mutation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&AppState) + 'static,
    {
        let active = Rc::new(Cell::new(true));
        self.registry.borrow_mut().entries.push(Entry {
            active: active.clone(),
            callback: Box::new(callback),
        });
        Subscription {
            active,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Call `callback` only when the value picked by `selector` changes.
    pub fn subscribe_slice<T, S, F>(&self, selector: S, mut callback: F) -> Subscription
    where
        T: PartialEq + 'static,
        S: Fn(&AppState) -> T + 'static,
        F: FnMut(&T) + 'static,
    {
        let mut last = selector(&self.state);
        self.subscribe(move |state| {
            let next = selector(state);
            if next != last {
                callback(&next);
                last = next;
            }
        })
    }

    // -----------------------------------------------------------------------
    // Mutating
    // -----------------------------------------------------------------------

    /// Apply `patch` atomically, then notify subscribers before returning.
    ///
    /// [`Patch::Remote`] is refused: remote users and scene objects are only
    /// inserted or removed by the sync bridge.
    pub fn dispatch(&mut self, patch: Patch) {
        if let Patch::Remote(change) = &patch {
            log::warn!("[store] ignoring remote change outside the sync path: {change:?}");
            return;
        }
        self.commit(patch);
    }

    /// Entry point for the sync apply path; entity insertion and removal
    /// happen only through here.
    #[cfg_attr(not(feature = "net"), allow(dead_code))]
    pub(crate) fn apply_remote(&mut self, change: RemoteChange) {
        self.commit(Patch::Remote(change));
    }

    fn commit(&mut self, patch: Patch) {
        if patch.apply(&mut self.state) {
            self.notify();
        }
    }

    fn notify(&mut self) {
        let mut reg = self.registry.borrow_mut();
        for entry in reg.entries.iter_mut() {
            if entry.active.get() {
                (entry.callback)(&self.state);
            }
        }
        reg.prune();
    }

    // --- session ---------------------------------------------------------

    pub fn set_user(&mut self, user: Option<User>) {
        self.dispatch(Patch::Session(SessionPatch {
            user: Some(user),
            ..Default::default()
        }));
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.dispatch(Patch::Session(SessionPatch {
            token: Some(token),
            ..Default::default()
        }));
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.dispatch(Patch::Session(SessionPatch {
            is_authenticated: Some(authenticated),
            ..Default::default()
        }));
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.dispatch(Patch::Session(SessionPatch {
            is_loading: Some(loading),
            ..Default::default()
        }));
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.dispatch(Patch::Session(SessionPatch {
            error: Some(error),
            ..Default::default()
        }));
    }

    /// Signed-in user and token in one mutation.
    pub fn sign_in(&mut self, user: User, token: String) {
        self.dispatch(Patch::Session(SessionPatch {
            user: Some(Some(user)),
            token: Some(Some(token)),
            is_authenticated: Some(true),
            error: Some(None),
            ..Default::default()
        }));
    }

    pub fn logout(&mut self) {
        self.dispatch(Patch::ClearSession);
    }

    // --- scene -----------------------------------------------------------

    pub fn set_current_scene(&mut self, scene: Option<Scene>) {
        self.dispatch(Patch::Scene(ScenePatch {
            current_scene: Some(scene),
            ..Default::default()
        }));
    }

    pub fn load_scene(&mut self, scene: Scene) {
        self.dispatch(Patch::LoadScene(scene));
    }

    pub fn set_assets<I: IntoIterator<Item = Asset>>(&mut self, assets: I) {
        let assets = assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        self.dispatch(Patch::Scene(ScenePatch {
            assets: Some(assets),
            ..Default::default()
        }));
    }

    /// Local edit of a known scene object.
    pub fn move_object(&mut self, id: impl Into<String>, patch: EntityPatch) {
        self.dispatch(Patch::MoveObject {
            id: id.into(),
            patch,
        });
    }

    pub fn set_environment(&mut self, environment: impl Into<String>) {
        self.dispatch(Patch::Scene(ScenePatch {
            environment: Some(environment.into()),
            ..Default::default()
        }));
    }

    pub fn set_lighting(&mut self, lighting: Lighting) {
        self.dispatch(Patch::Scene(ScenePatch {
            lighting: Some(lighting),
            ..Default::default()
        }));
    }

    // --- player ----------------------------------------------------------

    pub fn set_player_position(&mut self, position: Vec3) {
        self.dispatch(Patch::Player(PlayerPatch {
            position: Some(position),
            ..Default::default()
        }));
    }

    pub fn set_player_rotation(&mut self, rotation: Vec3) {
        self.dispatch(Patch::Player(PlayerPatch {
            rotation: Some(rotation),
            ..Default::default()
        }));
    }

    pub fn set_player_scale(&mut self, scale: Vec3) {
        self.dispatch(Patch::Player(PlayerPatch {
            scale: Some(scale),
            ..Default::default()
        }));
    }

    pub fn set_player_mode(&mut self, mode: PlayerMode) {
        self.dispatch(Patch::Player(PlayerPatch {
            mode: Some(mode),
            ..Default::default()
        }));
    }

    pub fn set_player_controls(&mut self, controls: PlayerControls) {
        self.dispatch(Patch::Player(PlayerPatch {
            controls: Some(controls),
            ..Default::default()
        }));
    }

    // --- ui --------------------------------------------------------------

    pub fn set_show_login(&mut self, show: bool) {
        self.dispatch(Patch::Ui(UiPatch {
            show_login: Some(show),
            ..Default::default()
        }));
    }

    pub fn set_show_inventory(&mut self, show: bool) {
        self.dispatch(Patch::Ui(UiPatch {
            show_inventory: Some(show),
            ..Default::default()
        }));
    }

    pub fn set_show_settings(&mut self, show: bool) {
        self.dispatch(Patch::Ui(UiPatch {
            show_settings: Some(show),
            ..Default::default()
        }));
    }

    pub fn set_show_chat(&mut self, show: bool) {
        self.dispatch(Patch::Ui(UiPatch {
            show_chat: Some(show),
            ..Default::default()
        }));
    }

    /// Append a notification and return its id.
    pub fn add_notification(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        duration: Option<Duration>,
    ) -> String {
        self.next_notification += 1;
        let id = format!("n{}", self.next_notification);
        self.dispatch(Patch::PushNotification(Notification {
            id: id.clone(),
            severity,
            message: message.into(),
            duration,
        }));
        id
    }

    pub fn remove_notification(&mut self, id: &str) {
        self.dispatch(Patch::DismissNotification(id.to_string()));
    }

    // --- whole state -----------------------------------------------------

    /// Restore every field to its initial value in one mutation.
    pub fn reset(&mut self) {
        self.dispatch(Patch::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fold;
    use crate::types::RemoteEntity;

    fn counter(store: &Store) -> (Rc<Cell<usize>>, Subscription) {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = store.subscribe(move |_| h.set(h.get() + 1));
        (hits, sub)
    }

    #[test]
    fn mutators_notify_synchronously() {
        let mut store = Store::new();
        let (hits, _sub) = counter(&store);

        store.set_loading(true);
        assert_eq!(hits.get(), 1);
        store.set_show_chat(true);
        assert_eq!(hits.get(), 2);
        assert!(store.state().session.is_loading);
        assert!(store.state().ui.show_chat);
    }

    #[test]
    fn subscriber_sees_post_mutation_state() {
        let mut store = Store::new();
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        let _sub = store.subscribe(move |st| *s.borrow_mut() = Some(st.player.position));

        store.set_player_position(Vec3::new(3.0, 0.0, 1.0));
        assert_eq!(*seen.borrow(), Some(Vec3::new(3.0, 0.0, 1.0)));
    }

    #[test]
    fn cancel_stops_notifications() {
        let mut store = Store::new();
        let (hits, sub) = counter(&store);
        sub.cancel();

        store.set_error(Some("x".into()));
        store.reset();
        assert_eq!(hits.get(), 0);
        assert!(!sub.is_active());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn cancel_from_inside_callback() {
        let mut store = Store::new();
        let hits = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let (h, s) = (hits.clone(), slot.clone());
        let sub = store.subscribe(move |_| {
            h.set(h.get() + 1);
            if let Some(sub) = s.borrow().as_ref() {
                sub.cancel();
            }
        });
        *slot.borrow_mut() = Some(sub);

        store.set_loading(true);
        store.set_loading(false);
        assert_eq!(hits.get(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn slice_subscriber_fires_on_change_only() {
        let mut store = Store::new();
        let modes = Rc::new(RefCell::new(Vec::new()));
        let m = modes.clone();
        let _sub = store.subscribe_slice(
            |s| s.player.mode,
            move |mode| m.borrow_mut().push(*mode),
        );

        store.set_show_chat(true);
        store.set_player_mode(PlayerMode::First);
        store.set_player_mode(PlayerMode::First);
        store.set_player_mode(PlayerMode::Third);

        assert_eq!(*modes.borrow(), vec![PlayerMode::First, PlayerMode::Third]);
    }

    #[test]
    fn notification_ids_are_unique_across_reset() {
        let mut store = Store::new();
        let a = store.add_notification(Severity::Info, "a", None);
        store.reset();
        let b = store.add_notification(Severity::Info, "b", None);
        assert_ne!(a, b);
        assert_eq!(store.state().ui.notifications.len(), 1);
    }

    #[test]
    fn no_op_remote_change_does_not_notify() {
        let mut store = Store::new();
        let (hits, _sub) = counter(&store);
        store.apply_remote(RemoteChange::Left {
            kind: crate::types::EntityKind::Object,
            id: "nope".into(),
        });
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn dispatch_refuses_remote_changes() {
        let mut store = Store::new();
        let (hits, _sub) = counter(&store);
        store.dispatch(Patch::Remote(RemoteChange::Joined {
            kind: crate::types::EntityKind::Object,
            entity: RemoteEntity::new("ghost"),
        }));
        assert!(store.state().scene.objects.is_empty());
        assert_eq!(hits.get(), 0);

        store.apply_remote(RemoteChange::Joined {
            kind: crate::types::EntityKind::Object,
            entity: RemoteEntity::new("box"),
        });
        assert!(store.state().scene.objects.contains_key("box"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn state_matches_fold_of_dispatched_and_remote_patches() {
        use crate::types::EntityKind;

        let patches = vec![
            Patch::Player(PlayerPatch {
                position: Some(Vec3::new(1.0, 2.0, 3.0)),
                ..Default::default()
            }),
            Patch::Remote(RemoteChange::Joined {
                kind: EntityKind::Object,
                entity: RemoteEntity::new("a").at(Vec3::new(1.0, 1.0, 1.0)),
            }),
            Patch::MoveObject {
                id: "a".into(),
                patch: EntityPatch::position(Vec3::new(2.0, 2.0, 2.0)),
            },
            Patch::MoveObject {
                id: "ghost".into(),
                patch: EntityPatch::position(Vec3::zero()),
            },
            Patch::Ui(UiPatch {
                show_inventory: Some(true),
                ..Default::default()
            }),
            Patch::Remote(RemoteChange::Left {
                kind: EntityKind::User,
                id: "nobody".into(),
            }),
            Patch::Scene(ScenePatch {
                environment: Some("dawn".into()),
                ..Default::default()
            }),
        ];

        let mut store = Store::new();
        let (hits, _sub) = counter(&store);
        for p in patches.clone() {
            match p {
                Patch::Remote(change) => store.apply_remote(change),
                p => store.dispatch(p),
            }
        }
        assert_eq!(*store.state(), fold(patches));
        // The ghost move and the unknown leave did not notify.
        assert_eq!(hits.get(), 5);
    }
}
