//! Application context: owns the [`Store`], the REST client, the token
//! store and (while connected) the [`SyncBridge`].
//!
//! Every backend call goes through the same funnel: clear the session
//! error, raise `is_loading`, await, lower `is_loading`, and on failure
//! record the error in the session slice plus an `error` notification.
//! The store is only touched with results after the call succeeded.
//!
//! Notifications raised here expire after [`NOTIFICATION_DURATION`]; the
//! owner of the context drives expiry with [`AppContext::next_dismissal`]
//! and [`AppContext::expire_notifications`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{AuthApi, ContentApi, WalletSigner};
use crate::error::ApiError;
use crate::persist::TokenStore;
use crate::store::Store;
use crate::sync::{BridgeEvent, Connector, SyncBridge, SyncConfig};
use crate::types::{
    Asset, AssetDraft, ConnectionState, EntityPatch, ProfileUpdate, RemoteEntity, Scene,
    SceneData, Severity, User, Vec3,
};

/// How long a notification raised by the context stays visible.
pub const NOTIFICATION_DURATION: Duration = Duration::from_millis(5000);

/// How long [`AppContext::cleanup_sync`] waits for the bridge task to say
/// goodbye before aborting it.
pub const SYNC_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

pub struct AppContext<A, T> {
    store: Store,
    api: A,
    tokens: T,
    bridge: Option<SyncBridge>,
    /// Pending notification dismissals, earliest first.
    dismissals: BinaryHeap<Reverse<(Instant, String)>>,
}

impl<A, T> AppContext<A, T>
where
    A: AuthApi + ContentApi,
    T: TokenStore,
{
    pub fn new(api: A, tokens: T) -> Self {
        Self {
            store: Store::new(),
            api,
            tokens,
            bridge: None,
            dismissals: BinaryHeap::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn bridge(&self) -> Option<&SyncBridge> {
        self.bridge.as_ref()
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Restore a persisted session. Returns `false` only when the token
    /// store itself could not be read.
    pub async fn initialize(&mut self) -> bool {
        let token = match self.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                log::error!("[app] cannot read saved session: {e}");
                self.store.set_error(Some(e.to_string()));
                return false;
            }
        };
        let Some(token) = token else {
            return true;
        };

        match self.api.validate(&token).await {
            Ok(true) => {
                log::info!("[app] restored saved session");
                self.api.set_token(Some(&token));
                self.store.set_token(Some(token));
                self.store.set_authenticated(true);
            }
            Ok(false) => {
                log::info!("[app] saved session expired");
                self.logout();
            }
            Err(e) => {
                log::warn!("[app] could not validate saved session: {e}");
                self.logout();
            }
        }
        true
    }

    /// Nonce, sign, login. On success the session is stored and persisted.
    pub async fn login_with_wallet<W: WalletSigner>(&mut self, wallet: &W) -> Result<User, ApiError> {
        self.begin();
        let result = self.wallet_login(wallet).await;
        let resp = self.finish(result)?;

        self.api.set_token(Some(&resp.token));
        if let Err(e) = self.tokens.save(&resp.token) {
            log::warn!("[app] could not persist session: {e}");
        }
        self.store.sign_in(resp.user.clone(), resp.token);
        self.notify(Severity::Success, "Signed in");
        Ok(resp.user)
    }

    async fn wallet_login<W: WalletSigner>(
        &self,
        wallet: &W,
    ) -> Result<crate::api::LoginResponse, ApiError> {
        let address = wallet.address().await?;
        crate::api::validate_address(&address)?;
        let nonce = self.api.request_nonce(&address).await?;
        let signature = wallet.sign_message(&nonce).await?;
        self.api.login(&address, &signature).await
    }

    /// Swap the current token for a fresh one.
    pub async fn refresh_token(&mut self) -> Result<(), ApiError> {
        self.begin();
        let result = match self.store.state().session.token.clone() {
            Some(token) => self.api.refresh(&token).await,
            None => Err(ApiError::Unauthenticated),
        };
        let token = self.finish(result)?;

        self.api.set_token(Some(&token));
        if let Err(e) = self.tokens.save(&token) {
            log::warn!("[app] could not persist refreshed token: {e}");
        }
        self.store.set_token(Some(token));
        Ok(())
    }

    pub fn logout(&mut self) {
        self.store.logout();
        self.api.set_token(None);
        if let Err(e) = self.tokens.clear() {
            log::warn!("[app] could not clear saved session: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    pub async fn load_scenes(&mut self) -> Result<Vec<Scene>, ApiError> {
        self.begin();
        let result = self.api.list_scenes().await;
        self.finish(result)
    }

    /// Fetch scene `id` and make it the active scene.
    pub async fn load_scene(&mut self, id: &str) -> Result<(), ApiError> {
        self.begin();
        let result = self.api.get_scene(id).await;
        let scene = self.finish(result)?;
        self.store.load_scene(scene);
        Ok(())
    }

    pub async fn create_scene(&mut self, data: &SceneData) -> Result<Scene, ApiError> {
        self.begin();
        let result = self.api.create_scene(data).await;
        let scene = self.finish(result)?;
        self.notify(
            Severity::Success,
            format!("Scene '{}' created", scene.data.name),
        );
        Ok(scene)
    }

    pub async fn load_assets(&mut self) -> Result<(), ApiError> {
        self.begin();
        let result = self.api.list_assets().await;
        let assets = self.finish(result)?;
        self.store.set_assets(assets);
        Ok(())
    }

    pub async fn create_asset(&mut self, draft: &AssetDraft) -> Result<Asset, ApiError> {
        self.begin();
        let result = self.api.create_asset(draft).await;
        let asset = self.finish(result)?;

        let mut assets: Vec<Asset> = self.store.state().scene.assets.values().cloned().collect();
        assets.push(asset.clone());
        self.store.set_assets(assets);
        Ok(asset)
    }

    pub async fn load_profile(&mut self, address: &str) -> Result<(), ApiError> {
        self.begin();
        let result = self.api.get_user(address).await;
        let user = self.finish(result)?;
        self.store.set_user(Some(user));
        Ok(())
    }

    pub async fn update_profile(
        &mut self,
        address: &str,
        profile: &ProfileUpdate,
    ) -> Result<(), ApiError> {
        self.begin();
        let result = self.api.update_user(address, profile).await;
        let user = self.finish(result)?;
        self.store.set_user(Some(user));
        self.notify(Severity::Success, "Profile updated");
        Ok(())
    }

    fn begin(&mut self) {
        self.store.set_error(None);
        self.store.set_loading(true);
    }

    fn finish<R>(&mut self, result: Result<R, ApiError>) -> Result<R, ApiError> {
        self.store.set_loading(false);
        if let Err(e) = &result {
            log::warn!("[app] request failed: {e}");
            if *e == ApiError::Unauthenticated {
                self.store.set_authenticated(false);
            }
            self.store.set_error(Some(e.to_string()));
            self.notify(Severity::Error, e.to_string());
        }
        result
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    /// Show a notification for [`NOTIFICATION_DURATION`]. Returns its id.
    pub fn notify(&mut self, severity: Severity, message: impl Into<String>) -> String {
        let id = self
            .store
            .add_notification(severity, message, Some(NOTIFICATION_DURATION));
        self.dismissals
            .push(Reverse((Instant::now() + NOTIFICATION_DURATION, id.clone())));
        id
    }

    /// Resolves when the earliest pending notification is due; never
    /// resolves while none is pending. The future does not borrow the
    /// context, so it can sit in a `select!` next to other calls.
    pub fn next_dismissal(&self) -> impl Future<Output = ()> + Send + 'static {
        let due = self.dismissals.peek().map(|Reverse((at, _))| *at);
        async move {
            match due {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        }
    }

    /// Remove every notification whose time is up. Returns their ids.
    pub fn expire_notifications(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        while let Some(Reverse((at, _))) = self.dismissals.peek() {
            if *at > now {
                break;
            }
            if let Some(Reverse((_, id))) = self.dismissals.pop() {
                self.store.remove_notification(&id);
                expired.push(id);
            }
        }
        expired
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Start (or restart) the bridge. The session token is used as the
    /// connect credential unless `config` carries one.
    pub async fn initialize_sync<C: Connector>(&mut self, mut config: SyncConfig, connector: C) {
        self.cleanup_sync().await;
        if config.token.is_none() {
            config.token = self.store.state().session.token.clone();
        }
        self.bridge = Some(SyncBridge::initialize(config, connector));
    }

    /// Tear down the bridge and forget remote presence. Waits up to
    /// [`SYNC_SHUTDOWN_GRACE`] for the disconnect to reach the server.
    pub async fn cleanup_sync(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            if !bridge.shutdown(SYNC_SHUTDOWN_GRACE).await {
                log::warn!("[app] sync bridge did not stop in time, aborted");
            }
        }
        BridgeEvent::State(ConnectionState::Disconnected).apply_to(&mut self.store);
    }

    /// Apply every pending bridge event. Returns how many were applied.
    pub fn pump_sync(&mut self) -> usize {
        let Some(bridge) = self.bridge.as_mut() else {
            return 0;
        };
        let events = bridge.poll();
        let n = events.len();
        for ev in events {
            ev.apply_to(&mut self.store);
        }
        n
    }

    /// Wait for the next bridge event, apply it and hand it back. `None`
    /// when no bridge is running or it has stopped.
    pub async fn next_sync_event(&mut self) -> Option<BridgeEvent> {
        let ev = self.bridge.as_mut()?.next_event().await?;
        ev.clone().apply_to(&mut self.store);
        Some(ev)
    }

    // -----------------------------------------------------------------------
    // Local actions
    //
    // Moves update the store first, then broadcast. Object creation and
    // removal are only requested here; the store changes when the channel
    // echoes the event back.
    // -----------------------------------------------------------------------

    fn local_user_id(&self) -> Option<String> {
        self.store.state().session.user.as_ref().map(|u| u.id.clone())
    }

    pub fn move_player(&mut self, position: Vec3) {
        self.store.set_player_position(position);
        if let (Some(bridge), Some(id)) = (&self.bridge, self.local_user_id()) {
            bridge.update_user_position(&id, position);
        }
    }

    pub fn rotate_player(&mut self, rotation: Vec3) {
        self.store.set_player_rotation(rotation);
        if let (Some(bridge), Some(id)) = (&self.bridge, self.local_user_id()) {
            bridge.update_user_rotation(&id, rotation);
        }
    }

    pub fn move_object(&mut self, id: &str, position: Vec3) {
        self.store.move_object(id, EntityPatch::position(position));
        if let Some(bridge) = &self.bridge {
            bridge.update_object_position(id, position);
        }
    }

    pub fn rotate_object(&mut self, id: &str, rotation: Vec3) {
        self.store.move_object(id, EntityPatch::rotation(rotation));
        if let Some(bridge) = &self.bridge {
            bridge.update_object_rotation(id, rotation);
        }
    }

    /// Ask the channel to create `object`. Without a bridge nothing happens.
    pub fn spawn_object(&self, object: RemoteEntity) {
        match &self.bridge {
            Some(bridge) => bridge.create_object(object),
            None => log::debug!("[app] not connected, '{}' not created", object.id),
        }
    }

    /// Ask the channel to remove object `id`.
    pub fn despawn_object(&self, id: &str) {
        match &self.bridge {
            Some(bridge) => bridge.remove_object(id),
            None => log::debug!("[app] not connected, '{id}' not removed"),
        }
    }
}
