//! [`AuthApi`] and [`ContentApi`] over `reqwest`.

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::{
    validate_address, validate_asset, validate_id, validate_scene, AuthApi, ContentApi,
    LoginResponse,
};
use crate::error::ApiError;
use crate::types::{Asset, AssetDraft, ProfileUpdate, Scene, SceneData, User};

pub struct HttpApi {
    client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct NonceResponse {
    nonce: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    new_token: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `<base>/<collection>/<id>` with `id` percent-encoded as a single
    /// path segment.
    fn item_url(&self, collection: &str, id: &str) -> Result<Url, ApiError> {
        let bad_base = || ApiError::Validation(format!("bad base url '{}'", self.base_url));
        let mut url = Url::parse(&self.url(collection)).map_err(|_| bad_base())?;
        url.path_segments_mut()
            .map_err(|_| bad_base())?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Attach the current bearer token, if any.
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = check(self.authed(req).send().await?).await?;
        Ok(resp.json::<T>().await?)
    }
}

/// Map non-2xx responses to [`ApiError::Server`], keeping the body as the
/// message.
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    log::warn!("[api] {} {}", status, body);
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthenticated);
    }
    Err(ApiError::Server {
        status: status.as_u16(),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    })
}

impl AuthApi for HttpApi {
    async fn request_nonce(&self, address: &str) -> Result<String, ApiError> {
        validate_address(address)?;
        let req = self
            .client
            .post(self.url("/auth/nonce"))
            .json(&json!({ "address": address }));
        let resp: NonceResponse = self.send(req).await?;
        Ok(resp.nonce)
    }

    async fn login(&self, address: &str, signature: &str) -> Result<LoginResponse, ApiError> {
        validate_address(address)?;
        if signature.is_empty() {
            return Err(ApiError::Validation("signature is empty".into()));
        }
        let req = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "address": address, "signature": signature }));
        self.send(req).await
    }

    async fn validate(&self, token: &str) -> Result<bool, ApiError> {
        let resp = self
            .client
            .post(self.url("/auth/validate"))
            .bearer_auth(token)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.url("/auth/refresh"))
            .bearer_auth(token)
            .send()
            .await?;
        let body: RefreshResponse = check(resp).await?.json().await?;
        Ok(body.new_token)
    }

    fn set_token(&self, token: Option<&str>) {
        *self.token.write() = token.map(str::to_string);
    }
}

impl ContentApi for HttpApi {
    async fn list_scenes(&self) -> Result<Vec<Scene>, ApiError> {
        self.send(self.client.get(self.url("/scenes"))).await
    }

    async fn get_scene(&self, id: &str) -> Result<Scene, ApiError> {
        validate_id("scene", id)?;
        let url = self.item_url("/scenes", id)?;
        self.send(self.client.get(url)).await
    }

    async fn create_scene(&self, data: &SceneData) -> Result<Scene, ApiError> {
        validate_scene(data)?;
        self.send(self.client.post(self.url("/scenes")).json(data))
            .await
    }

    async fn list_assets(&self) -> Result<Vec<Asset>, ApiError> {
        self.send(self.client.get(self.url("/assets"))).await
    }

    async fn get_asset(&self, id: &str) -> Result<Asset, ApiError> {
        validate_id("asset", id)?;
        let url = self.item_url("/assets", id)?;
        self.send(self.client.get(url)).await
    }

    async fn create_asset(&self, draft: &AssetDraft) -> Result<Asset, ApiError> {
        validate_asset(draft)?;
        self.send(self.client.post(self.url("/assets")).json(draft))
            .await
    }

    async fn get_user(&self, address: &str) -> Result<User, ApiError> {
        validate_address(address)?;
        let url = self.item_url("/users", address)?;
        self.send(self.client.get(url)).await
    }

    async fn update_user(&self, address: &str, profile: &ProfileUpdate) -> Result<User, ApiError> {
        validate_address(address)?;
        let url = self.item_url("/users", address)?;
        self.send(self.client.put(url).json(profile)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpApi::new("http://localhost:8000/");
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/scenes"), "http://localhost:8000/scenes");
    }

    #[test]
    fn bearer_token_is_shared() {
        let api = HttpApi::new("http://localhost:8000");
        assert_eq!(api.token(), None);
        api.set_token(Some("abc"));
        assert_eq!(api.token().as_deref(), Some("abc"));
        api.set_token(None);
        assert_eq!(api.token(), None);
    }

    #[test]
    fn validation_runs_before_any_request() {
        // Nothing listens on this port; a network call would surface as a
        // transport error instead of a validation error.
        let api = HttpApi::new("http://127.0.0.1:9");
        let err = tokio_test::block_on(api.get_scene("")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = tokio_test::block_on(api.get_user("nope")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = tokio_test::block_on(api.create_scene(&SceneData::default())).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn ids_stay_inside_one_path_segment() {
        let api = HttpApi::new("http://localhost:8000/v1/");
        assert_eq!(
            api.item_url("/scenes", "s1").unwrap().as_str(),
            "http://localhost:8000/v1/scenes/s1"
        );
        assert_eq!(
            api.item_url("/scenes", "a/b").unwrap().as_str(),
            "http://localhost:8000/v1/scenes/a%2Fb"
        );
        let url = api.item_url("/assets", "x?y#z").unwrap();
        assert_eq!(url.path(), "/v1/assets/x%3Fy%23z");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn dot_segment_ids_are_rejected() {
        let api = HttpApi::new("http://127.0.0.1:9");
        let err = tokio_test::block_on(api.get_scene("..")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = tokio_test::block_on(api.get_asset(".")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn refresh_body_uses_new_token_key() {
        let body: RefreshResponse = serde_json::from_str(r#"{"newToken":"t2"}"#).unwrap();
        assert_eq!(body.new_token, "t2");
    }
}
