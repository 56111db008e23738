//! Content and auth REST clients.
//!
//! | Trait          | Endpoints                                         |
//! |----------------|---------------------------------------------------|
//! | [`AuthApi`]    | `POST /auth/{nonce,login,validate,refresh}`       |
//! | [`ContentApi`] | `/scenes`, `/assets`, `/users/:address`           |
//!
//! Input is validated before any request leaves the process; see
//! [`validate_address`], [`validate_id`] and [`validate_scene`].

mod http;

pub use http::HttpApi;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::{Asset, AssetDraft, ProfileUpdate, Scene, SceneData, User};

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

// The futures are awaited on the application thread only, so no `Send`
// bound is imposed on implementations.
#[allow(async_fn_in_trait)]
pub trait AuthApi {
    /// Message the wallet must sign to prove ownership of `address`.
    async fn request_nonce(&self, address: &str) -> Result<String, ApiError>;

    async fn login(&self, address: &str, signature: &str) -> Result<LoginResponse, ApiError>;

    /// `Ok(false)` when the backend rejects the token; `Err` only when the
    /// question could not be asked.
    async fn validate(&self, token: &str) -> Result<bool, ApiError>;

    /// Exchange `token` for a fresh one.
    async fn refresh(&self, token: &str) -> Result<String, ApiError>;

    /// Attach (or drop) the bearer token used by later requests.
    fn set_token(&self, token: Option<&str>);
}

#[allow(async_fn_in_trait)]
pub trait ContentApi {
    async fn list_scenes(&self) -> Result<Vec<Scene>, ApiError>;
    async fn get_scene(&self, id: &str) -> Result<Scene, ApiError>;
    async fn create_scene(&self, data: &SceneData) -> Result<Scene, ApiError>;

    async fn list_assets(&self) -> Result<Vec<Asset>, ApiError>;
    async fn get_asset(&self, id: &str) -> Result<Asset, ApiError>;
    async fn create_asset(&self, draft: &AssetDraft) -> Result<Asset, ApiError>;

    async fn get_user(&self, address: &str) -> Result<User, ApiError>;
    async fn update_user(&self, address: &str, profile: &ProfileUpdate) -> Result<User, ApiError>;
}

/// Wallet able to sign a login nonce. Wallet discovery and key management
/// are up to the embedding application.
#[allow(async_fn_in_trait)]
pub trait WalletSigner {
    async fn address(&self) -> Result<String, ApiError>;
    async fn sign_message(&self, message: &str) -> Result<String, ApiError>;
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// `0x` followed by exactly 40 hex digits.
pub fn validate_address(address: &str) -> Result<(), ApiError> {
    let hex = address
        .strip_prefix("0x")
        .ok_or_else(|| ApiError::Validation(format!("address '{address}' lacks 0x prefix")))?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ApiError::Validation(format!(
            "address '{address}' is not 40 hex digits"
        )));
    }
    Ok(())
}

pub fn validate_id(what: &str, id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::Validation(format!("{what} id is empty")));
    }
    // Dot segments would be resolved away by the URL parser.
    if id == "." || id == ".." {
        return Err(ApiError::Validation(format!("{what} id '{id}' is not a name")));
    }
    Ok(())
}

pub fn validate_scene(data: &SceneData) -> Result<(), ApiError> {
    if data.name.trim().is_empty() {
        return Err(ApiError::Validation("scene name is empty".into()));
    }
    Ok(())
}

pub fn validate_asset(draft: &AssetDraft) -> Result<(), ApiError> {
    if draft.metadata.name.trim().is_empty() {
        return Err(ApiError::Validation("asset name is empty".into()));
    }
    if draft.metadata.format.trim().is_empty() {
        return Err(ApiError::Validation("asset format is empty".into()));
    }
    Ok(())
}
