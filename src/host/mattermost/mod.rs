//! Mattermost host.
//!
//! Implements [`HostApi`] over the Mattermost REST API v4. The configured
//! token authenticates lookups and bot provisioning. Posts are sent with a
//! personal access token of their author, minted on first use and kept in
//! the [`FileKvStore`] next to the mention lists.

mod config;

pub use config::MattermostConfig;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{OnceCell, RwLock};

use super::{BotSpec, Channel, FileKvStore, HostApi, Team, User};
use crate::error::{ConfigError, HostError};
use crate::format::Post;

/// Error body returned by the Mattermost API.
#[derive(Debug, Deserialize)]
struct AppError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    detailed_error: String,
}

impl AppError {
    fn describe(&self) -> String {
        let message = if self.message.is_empty() { &self.id } else { &self.message };
        if self.detailed_error.is_empty() {
            message.clone()
        } else {
            format!("{}, {}", message, self.detailed_error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    token: String,
}

/// Key-value prefix for persisted author tokens.
const TOKEN_KEY_PREFIX: &str = "matterbar_token_";

pub struct MattermostHost {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    kv: FileKvStore,
    /// User id the configured token belongs to.
    owner: OnceCell<String>,
    /// Author user id -> access token.
    tokens: RwLock<HashMap<String, String>>,
}

impl MattermostHost {
    pub fn new(config: &MattermostConfig, kv: FileKvStore) -> Result<Self, ConfigError> {
        config.validate().map_err(|reason| ConfigError::InvalidValue {
            key: "mattermost".to_string(),
            reason,
        })?;

        let base_url = Url::parse(&config.url).map_err(|e| ConfigError::InvalidValue {
            key: "mattermost.url".to_string(),
            reason: e.to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "mattermost".to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(url = %base_url, kv = %kv.path().display(), "Mattermost host initialized");

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            kv,
            owner: OnceCell::new(),
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// `{base}/api/v4/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, HostError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                HostError::InvalidResponse(format!("{} cannot be a base URL", self.base_url))
            })?
            .pop_if_empty()
            .push("api")
            .push("v4")
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, HostError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AppError>(&body)
            .map(|e| e.describe())
            .unwrap_or(body);

        Err(HostError::Api { status, message })
    }

    /// GET a resource, mapping 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        segments: &[&str],
    ) -> Result<Option<T>, HostError> {
        let response = self
            .client
            .get(self.endpoint(segments)?)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = Self::check(response).await?.json().await?;
        Ok(Some(body))
    }

    async fn owner_id(&self) -> Result<&str, HostError> {
        let id = self
            .owner
            .get_or_try_init(|| async {
                let me: User = self.get_optional(&["users", "me"]).await?.ok_or_else(|| {
                    HostError::InvalidResponse("no user behind the configured token".to_string())
                })?;
                Ok::<_, HostError>(me.id)
            })
            .await?;
        Ok(id.as_str())
    }

    /// The access token that posts as `user_id`.
    ///
    /// The configured token is used for its own owner and for posts with no
    /// author. Any other author gets a personal access token, created once
    /// and persisted.
    async fn token_for(&self, user_id: &str) -> Result<String, HostError> {
        if user_id.is_empty() || user_id == self.owner_id().await? {
            return Ok(self.token.clone());
        }

        if let Some(token) = self.tokens.read().await.get(user_id) {
            return Ok(token.clone());
        }

        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.get(user_id) {
            return Ok(token.clone());
        }

        let key = format!("{}{}", TOKEN_KEY_PREFIX, user_id);
        let token = match self.kv.get(&key).await {
            Some(bytes) => String::from_utf8(bytes)
                .map_err(|e| HostError::Store(format!("{}: {}", key, e)))?,
            None => {
                let token = self.create_access_token(user_id).await?;
                self.kv.set(&key, token.as_bytes()).await?;
                token
            }
        };

        tokens.insert(user_id.to_string(), token.clone());
        Ok(token)
    }

    async fn create_access_token(&self, user_id: &str) -> Result<String, HostError> {
        let response = self
            .client
            .post(self.endpoint(&["users", user_id, "tokens"])?)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "description": "matterbar relay" }))
            .send()
            .await?;

        let created: AccessToken = Self::check(response).await?.json().await?;
        tracing::info!(user_id = %user_id, "Created access token for post author");
        Ok(created.token)
    }
}

#[async_trait]
impl HostApi for MattermostHost {
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, HostError> {
        self.get_optional(&["teams", "name", name]).await
    }

    async fn get_channel_by_name(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<Channel>, HostError> {
        self.get_optional(&["teams", team_id, "channels", "name", name]).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, HostError> {
        self.get_optional(&["users", "username", username]).await
    }

    async fn ensure_bot(&self, bot: &BotSpec) -> Result<String, HostError> {
        if let Some(user) = self.get_user_by_username(&bot.username).await? {
            tracing::debug!(username = %bot.username, user_id = %user.id, "Bot account exists");
            self.token_for(&user.id).await?;
            return Ok(user.id);
        }

        let response = self
            .client
            .post(self.endpoint(&["bots"])?)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "username": bot.username,
                "display_name": bot.display_name,
                "description": bot.description,
            }))
            .send()
            .await?;

        let created: BotResponse = Self::check(response).await?.json().await?;
        tracing::info!(username = %bot.username, user_id = %created.user_id, "Created bot account");
        self.token_for(&created.user_id).await?;
        Ok(created.user_id)
    }

    async fn create_post(&self, post: &Post) -> Result<(), HostError> {
        // Mattermost attributes a post to the owner of the token that sends it.
        let token = self.token_for(&post.user_id).await?;

        let mut body = serde_json::json!({
            "channel_id": post.channel_id,
            "message": post.message,
            "props": post.props,
        });
        if !post.post_type.is_empty() {
            body["type"] = serde_json::Value::from(post.post_type.clone());
        }

        let response = self
            .client
            .post(self.endpoint(&["posts"])?)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.kv.get(key).await)
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        self.kv.set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as MockStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Recorded {
        /// (Authorization header, body) per created post.
        posts: Vec<(String, Value)>,
        minted: usize,
    }

    type Shared = Arc<Mutex<Recorded>>;

    /// A minimal Mattermost API: the configured token belongs to `admin-id`,
    /// and `rollbar` is an existing bot with id `bot-id`.
    async fn mock_mattermost() -> (String, Shared) {
        let recorded = Shared::default();
        let app = Router::new()
            .route(
                "/api/v4/users/me",
                get(|| async { Json(json!({"id": "admin-id", "username": "admin"})) }),
            )
            .route(
                "/api/v4/users/username/:name",
                get(|Path(name): Path<String>| async move {
                    if name == "rollbar" {
                        Ok(Json(json!({"id": "bot-id", "username": "rollbar"})))
                    } else {
                        Err(MockStatus::NOT_FOUND)
                    }
                }),
            )
            .route(
                "/api/v4/users/:id/tokens",
                post(|State(recorded): State<Shared>, Path(id): Path<String>| async move {
                    recorded.lock().unwrap().minted += 1;
                    let token = format!("token-for-{}", id);
                    Json(json!({"id": "token-id", "token": token, "user_id": id}))
                }),
            )
            .route(
                "/api/v4/posts",
                post(
                    |State(recorded): State<Shared>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        recorded.lock().unwrap().posts.push((auth, body));
                        (MockStatus::CREATED, Json(json!({"id": "post-id"})))
                    },
                ),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), recorded)
    }

    fn last_auth(recorded: &Shared) -> String {
        recorded.lock().unwrap().posts.last().unwrap().0.clone()
    }

    async fn build_host(url: &str) -> (MattermostHost, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::open(dir.path().join("kv.json")).await.unwrap();
        let host = MattermostHost::new(&MattermostConfig::new(url, "token"), kv).unwrap();
        (host, dir)
    }

    #[tokio::test]
    async fn test_endpoint_building() {
        let (host, _dir) = build_host("https://chat.example.com").await;
        assert_eq!(
            host.endpoint(&["teams", "name", "eng"]).unwrap().as_str(),
            "https://chat.example.com/api/v4/teams/name/eng"
        );

        let (host, _dir) = build_host("https://chat.example.com/mm/").await;
        assert_eq!(
            host.endpoint(&["users", "username", "a b"]).unwrap().as_str(),
            "https://chat.example.com/mm/api/v4/users/username/a%20b"
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKvStore::open(dir.path().join("kv.json")).await.unwrap();
        assert!(MattermostHost::new(&MattermostConfig::new("chat", "token"), kv).is_err());
    }

    #[tokio::test]
    async fn test_kv_delegates_to_file_store() {
        let (host, _dir) = build_host("http://localhost:8065").await;
        host.kv_set("chan", br#"{"bob":true}"#).await.unwrap();
        assert_eq!(host.kv_get("chan").await.unwrap().unwrap(), br#"{"bob":true}"#.to_vec());
    }

    #[tokio::test]
    async fn test_posts_are_authored_by_the_bot() {
        let (url, recorded) = mock_mattermost().await;
        let (host, dir) = build_host(&url).await;

        let bot_id = host.ensure_bot(&BotSpec::rollbar("rollbar")).await.unwrap();
        assert_eq!(bot_id, "bot-id");
        assert_eq!(recorded.lock().unwrap().minted, 1);

        host.create_post(&Post::text("chan-1", &bot_id, "hello")).await.unwrap();
        assert_eq!(last_auth(&recorded), "Bearer token-for-bot-id");
        assert_eq!(recorded.lock().unwrap().posts[0].1["channel_id"], "chan-1");

        // The minted token survives a restart.
        let kv = FileKvStore::open(dir.path().join("kv.json")).await.unwrap();
        let restarted = MattermostHost::new(&MattermostConfig::new(&url, "token"), kv).unwrap();
        restarted
            .create_post(&Post::text("chan-1", "bot-id", "again"))
            .await
            .unwrap();
        assert_eq!(last_auth(&recorded), "Bearer token-for-bot-id");
        assert_eq!(recorded.lock().unwrap().minted, 1);
    }

    #[tokio::test]
    async fn test_token_owner_posts_with_configured_token() {
        let (url, recorded) = mock_mattermost().await;
        let (host, _dir) = build_host(&url).await;

        host.create_post(&Post::text("chan-1", "admin-id", "hi")).await.unwrap();
        assert_eq!(last_auth(&recorded), "Bearer token");

        host.create_post(&Post::text("chan-1", "", "hi")).await.unwrap();
        assert_eq!(last_auth(&recorded), "Bearer token");
        assert_eq!(recorded.lock().unwrap().minted, 0);
    }

    #[test]
    fn test_app_error_description() {
        let err: AppError = serde_json::from_str(
            r#"{"id": "api.post.create", "message": "error", "detailed_error": "detailed error", "status_code": 500}"#,
        )
        .unwrap();
        assert_eq!(err.describe(), "error, detailed error");

        let err: AppError = serde_json::from_str(r#"{"id": "store.sql.not_found"}"#).unwrap();
        assert_eq!(err.describe(), "store.sql.not_found");
    }
}
