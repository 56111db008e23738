//! `AppState` and the closed set of patches that mutate it.
//!
//! A [`Patch`] is the unit of atomic change: [`Patch::apply`] either replaces
//! a slice field or merges a partial object, never anything in between. The
//! store's state after a sequence of patches is always the left fold of those
//! patches over [`AppState::default`].

use std::collections::HashMap;

use crate::types::{
    Asset, ConnectionState, EntityKind, EntityPatch, Lighting, Notification, PlayerControls,
    PlayerMode, RemoteEntity, Scene, User, Vec3, DEFAULT_ENVIRONMENT,
};

// ---------------------------------------------------------------------------
// Slices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub current_scene: Option<Scene>,
    pub assets: HashMap<String, Asset>,
    /// Shared scene objects, keyed by id.
    pub objects: HashMap<String, RemoteEntity>,
    pub environment: String,
    pub lighting: Lighting,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            current_scene: None,
            assets: HashMap::new(),
            objects: HashMap::new(),
            environment: DEFAULT_ENVIRONMENT.into(),
            lighting: Lighting::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub mode: PlayerMode,
    pub controls: PlayerControls,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            rotation: Vec3::zero(),
            scale: Vec3::splat(1.0),
            mode: PlayerMode::Third,
            controls: PlayerControls::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub show_login: bool,
    pub show_inventory: bool,
    pub show_settings: bool,
    pub show_chat: bool,
    /// FIFO: oldest first.
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    pub connection: ConnectionState,
    /// Other users on the channel, keyed by id.
    pub users: HashMap<String, RemoteEntity>,
}

/// The whole client-side application state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub session: Session,
    pub scene: SceneState,
    pub player: PlayerState,
    pub ui: UiState,
    pub presence: PresenceState,
}

impl AppState {
    pub fn entities(&self, kind: EntityKind) -> &HashMap<String, RemoteEntity> {
        match kind {
            EntityKind::User => &self.presence.users,
            EntityKind::Object => &self.scene.objects,
        }
    }

    fn entities_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, RemoteEntity> {
        match kind {
            EntityKind::User => &mut self.presence.users,
            EntityKind::Object => &mut self.scene.objects,
        }
    }
}

// ---------------------------------------------------------------------------
// Partial patches
// ---------------------------------------------------------------------------

/// Partial session. `None` leaves a field untouched; `Some(None)` clears an
/// optional one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub user: Option<Option<User>>,
    pub token: Option<Option<String>>,
    pub is_authenticated: Option<bool>,
    pub is_loading: Option<bool>,
    pub error: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenePatch {
    pub current_scene: Option<Option<Scene>>,
    pub assets: Option<HashMap<String, Asset>>,
    pub environment: Option<String>,
    pub lighting: Option<Lighting>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub mode: Option<PlayerMode>,
    pub controls: Option<PlayerControls>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiPatch {
    pub show_login: Option<bool>,
    pub show_inventory: Option<bool>,
    pub show_settings: Option<bool>,
    pub show_chat: Option<bool>,
}

macro_rules! merge_fields {
    ($target:expr, $patch:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(v) = $patch.$field {
                $target.$field = v;
            }
        )+
    };
}

impl SessionPatch {
    fn apply(self, s: &mut Session) {
        merge_fields!(s, self, user, token, is_authenticated, is_loading, error);
    }
}

impl ScenePatch {
    fn apply(self, s: &mut SceneState) {
        merge_fields!(s, self, current_scene, assets, environment, lighting);
    }
}

impl PlayerPatch {
    fn apply(self, s: &mut PlayerState) {
        merge_fields!(s, self, position, rotation, scale, mode, controls);
    }
}

impl UiPatch {
    fn apply(self, s: &mut UiState) {
        merge_fields!(s, self, show_login, show_inventory, show_settings, show_chat);
    }
}

// ---------------------------------------------------------------------------
// Remote changes (inserted only by the sync apply path)
// ---------------------------------------------------------------------------

/// A change mirrored from the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    /// Insert if absent; an existing id is merged instead.
    Joined {
        kind: EntityKind,
        entity: RemoteEntity,
    },
    /// Remove if present.
    Left { kind: EntityKind, id: String },
    /// Merge into an existing entity; unknown ids are dropped.
    Updated {
        kind: EntityKind,
        id: String,
        patch: EntityPatch,
    },
    Connection(ConnectionState),
    /// Forget every remote user (the channel they came from is gone).
    ClearPresence,
}

impl RemoteChange {
    /// Returns `false` when the change was a no-op.
    fn apply(self, state: &mut AppState) -> bool {
        match self {
            RemoteChange::Joined { kind, entity } => {
                let map = state.entities_mut(kind);
                match map.get_mut(&entity.id) {
                    Some(existing) => {
                        log::debug!("[state] duplicate {kind} join for '{}'", entity.id);
                        let before = existing.clone();
                        existing.merge(entity.into_patch());
                        *existing != before
                    }
                    None => {
                        map.insert(entity.id.clone(), entity);
                        true
                    }
                }
            }
            RemoteChange::Left { kind, id } => {
                let removed = state.entities_mut(kind).remove(&id).is_some();
                if !removed {
                    log::debug!("[state] {kind} leave for unknown id '{id}'");
                }
                removed
            }
            RemoteChange::Updated { kind, id, patch } => {
                match state.entities_mut(kind).get_mut(&id) {
                    Some(existing) => {
                        existing.merge(patch);
                        true
                    }
                    None => {
                        log::debug!("[state] dropping {kind} update for unknown id '{id}'");
                        false
                    }
                }
            }
            RemoteChange::Connection(c) => {
                let changed = state.presence.connection != c;
                state.presence.connection = c;
                changed
            }
            RemoteChange::ClearPresence => {
                let changed = !state.presence.users.is_empty();
                state.presence.users.clear();
                changed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Every way the application state can change.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Session(SessionPatch),
    Scene(ScenePatch),
    Player(PlayerPatch),
    Ui(UiPatch),
    /// Activate `scene`: replaces the active scene, objects, environment
    /// and lighting together.
    LoadScene(Scene),
    /// Merge `patch` into an already known scene object. Local input path;
    /// unknown ids are ignored.
    MoveObject { id: String, patch: EntityPatch },
    PushNotification(Notification),
    DismissNotification(String),
    /// Mirrored from the real-time channel. Only the sync bridge applies
    /// these; [`Store::dispatch`](crate::store::Store::dispatch) refuses them.
    Remote(RemoteChange),
    /// Clear the session slice (logout).
    ClearSession,
    /// Restore every slice to its initial value.
    Reset,
}

impl Patch {
    /// Apply this patch. Returns `false` if the state is known to be
    /// unchanged, in which case subscribers are not notified.
    pub fn apply(self, state: &mut AppState) -> bool {
        match self {
            Patch::Session(p) => p.apply(&mut state.session),
            Patch::Scene(p) => p.apply(&mut state.scene),
            Patch::Player(p) => p.apply(&mut state.player),
            Patch::Ui(p) => p.apply(&mut state.ui),
            Patch::LoadScene(scene) => {
                let objects = scene
                    .data
                    .objects
                    .iter()
                    .map(|o| (o.id.clone(), o.clone()))
                    .collect();
                state.scene.environment = scene.data.settings.environment.clone();
                state.scene.lighting = scene.data.settings.lighting;
                state.scene.objects = objects;
                state.scene.current_scene = Some(scene);
            }
            Patch::MoveObject { id, patch } => match state.scene.objects.get_mut(&id) {
                Some(obj) => obj.merge(patch),
                None => return false,
            },
            Patch::PushNotification(n) => state.ui.notifications.push(n),
            Patch::DismissNotification(id) => {
                let before = state.ui.notifications.len();
                state.ui.notifications.retain(|n| n.id != id);
                return state.ui.notifications.len() != before;
            }
            Patch::Remote(change) => return change.apply(state),
            Patch::ClearSession => state.session = Session::default(),
            Patch::Reset => *state = AppState::default(),
        }
        true
    }
}

/// Left fold of `patches` over the initial state.
pub fn fold<I: IntoIterator<Item = Patch>>(patches: I) -> AppState {
    patches.into_iter().fold(AppState::default(), |mut s, p| {
        p.apply(&mut s);
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SceneData, SceneSettings, Severity};

    #[test]
    fn initial_values() {
        let s = AppState::default();
        assert_eq!(s.session, Session::default());
        assert!(!s.session.is_authenticated);
        assert_eq!(s.scene.environment, "sunset");
        assert_eq!(s.scene.lighting.ambient, Vec3::splat(1.0));
        assert_eq!(s.player.position, Vec3::new(0.0, 2.0, 5.0));
        assert_eq!(s.player.mode, PlayerMode::Third);
        assert!(s.player.controls.enabled);
        assert!(!s.player.controls.locked);
        assert!(s.ui.notifications.is_empty());
        assert_eq!(s.presence.connection, ConnectionState::Disconnected);
    }

    #[test]
    fn session_patch_only_touches_set_fields() {
        let mut s = AppState::default();
        Patch::Session(SessionPatch {
            error: Some(Some("boom".into())),
            ..Default::default()
        })
        .apply(&mut s);
        Patch::Session(SessionPatch {
            is_loading: Some(true),
            ..Default::default()
        })
        .apply(&mut s);

        assert_eq!(s.session.error.as_deref(), Some("boom"));
        assert!(s.session.is_loading);

        Patch::Session(SessionPatch {
            error: Some(None),
            ..Default::default()
        })
        .apply(&mut s);
        assert!(s.session.error.is_none());
        assert!(s.session.is_loading);
    }

    #[test]
    fn load_scene_replaces_objects_and_settings() {
        let mut s = AppState::default();
        s.scene.objects.insert("old".into(), RemoteEntity::new("old"));

        let scene = Scene {
            id: "s1".into(),
            data: SceneData {
                name: "plaza".into(),
                objects: vec![RemoteEntity::new("fountain"), RemoteEntity::new("bench")],
                settings: SceneSettings {
                    environment: "night".into(),
                    ..Default::default()
                },
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        };
        assert!(Patch::LoadScene(scene).apply(&mut s));

        assert_eq!(s.scene.environment, "night");
        assert_eq!(s.scene.objects.len(), 2);
        assert!(!s.scene.objects.contains_key("old"));
        assert_eq!(s.scene.current_scene.as_ref().map(|s| s.id.as_str()), Some("s1"));
    }

    #[test]
    fn move_unknown_object_is_noop() {
        let mut s = AppState::default();
        let changed = Patch::MoveObject {
            id: "ghost".into(),
            patch: EntityPatch::position(Vec3::splat(1.0)),
        }
        .apply(&mut s);
        assert!(!changed);
        assert!(s.scene.objects.is_empty());
    }

    #[test]
    fn dismiss_keeps_fifo_order() {
        let n = |id: &str| Notification {
            id: id.into(),
            severity: Severity::Info,
            message: id.into(),
            duration: None,
        };
        let s = fold([
            Patch::PushNotification(n("1")),
            Patch::PushNotification(n("2")),
            Patch::PushNotification(n("3")),
            Patch::DismissNotification("2".into()),
        ]);
        let ids: Vec<_> = s.ui.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn duplicate_join_merges_without_duplicating() {
        let mut s = AppState::default();
        let join = |x: f32| {
            Patch::Remote(RemoteChange::Joined {
                kind: EntityKind::User,
                entity: RemoteEntity::new("u1").at(Vec3::new(x, 0.0, 0.0)),
            })
        };
        assert!(join(1.0).apply(&mut s));
        assert!(!join(1.0).apply(&mut s));
        assert!(join(2.0).apply(&mut s));
        assert_eq!(s.presence.users.len(), 1);
        assert_eq!(s.presence.users["u1"].position.x, 2.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = AppState::default();
        s.ui.show_chat = true;
        s.player.mode = PlayerMode::First;
        s.presence.connection = ConnectionState::Connected;
        assert!(Patch::Reset.apply(&mut s));
        assert_eq!(s, AppState::default());
    }
}
