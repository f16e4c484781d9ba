//! Relay lifecycle and the webhook pipeline.
//!
//! A [`Relay`] owns the injected host, the active configuration snapshot and
//! the mention store. `matterbar serve` drives it through:
//!
//! 1. [`Relay::on_activate`]: make sure the bot account exists.
//! 2. [`Relay::on_configuration_change`]: resolve configured names to ids.
//!    Called again on every reload.
//! 3. [`Relay::notify`]: one call per incoming webhook.

mod settings;

pub use settings::{ConfigStore, PluginSettings, ResolvedConfig};

use std::sync::Arc;

use subtle::ConstantTimeEq;

use crate::error::{ConfigError, HostError, NotifyError, RelayError};
use crate::format::LinkTemplates;
use crate::host::{BotSpec, HostApi};
use crate::mentions::MentionStore;
use crate::rollbar::{Event, ExceptionSource};

/// Query parameters of `POST /notify`. Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyQuery {
    pub auth: String,
    pub team: String,
    pub channel: String,
}

impl NotifyQuery {
    /// Build from decoded query pairs. The first value of a repeated key
    /// wins and unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut query = Self::default();
        let mut seen = [false; 3];
        for (key, value) in pairs {
            let (slot, field) = match key.as_str() {
                "auth" => (0, &mut query.auth),
                "team" => (1, &mut query.team),
                "channel" => (2, &mut query.channel),
                _ => continue,
            };
            if !seen[slot] {
                seen[slot] = true;
                *field = value;
            }
        }
        query
    }
}

pub struct Relay {
    host: Arc<dyn HostApi>,
    config: ConfigStore,
    mentions: MentionStore,
}

impl Relay {
    /// A relay whose configuration is not yet resolved.
    pub fn new(host: Arc<dyn HostApi>, settings: PluginSettings, links: LinkTemplates) -> Self {
        Self {
            mentions: MentionStore::new(host.clone()),
            config: ConfigStore::new(ResolvedConfig::new(settings, links)),
            host,
        }
    }

    pub fn host(&self) -> &Arc<dyn HostApi> {
        &self.host
    }

    pub fn mentions(&self) -> &MentionStore {
        &self.mentions
    }

    /// The active configuration.
    pub fn config(&self) -> Arc<ResolvedConfig> {
        self.config.snapshot()
    }

    /// Ensure the bot account exists and post as it from now on.
    pub async fn on_activate(&self) -> Result<String, RelayError> {
        let current = self.config.snapshot();
        let bot = BotSpec::rollbar(&current.settings.username);

        let bot_user_id = self
            .host
            .ensure_bot(&bot)
            .await
            .map_err(RelayError::Activation)?;

        tracing::info!(username = %bot.username, user_id = %bot_user_id, "Relay activated");
        self.config.replace(current.with_bot_user_id(&bot_user_id));
        Ok(bot_user_id)
    }

    /// Resolve `settings` against the host and publish the result.
    ///
    /// On failure the previous configuration stays active.
    pub async fn on_configuration_change(
        &self,
        settings: PluginSettings,
        links: LinkTemplates,
    ) -> Result<(), ConfigError> {
        let resolved = self.resolve(settings, links).await.map_err(|e| {
            tracing::warn!(error = %e, "Keeping previous configuration");
            e
        })?;

        tracing::info!(
            team = %resolved.settings.default_team,
            channel = %resolved.settings.default_channel,
            username = %resolved.settings.username,
            "Configuration applied"
        );
        self.config.replace(resolved);
        Ok(())
    }

    async fn resolve(
        &self,
        settings: PluginSettings,
        links: LinkTemplates,
    ) -> Result<ResolvedConfig, ConfigError> {
        settings.validate()?;

        let user = lookup("user", self.host.get_user_by_username(&settings.username).await);
        let Some(user) = user else {
            return Err(unresolved(format!("no user with Username {} exists", settings.username)));
        };

        let mut team_id = String::new();
        if !settings.default_team.is_empty() {
            match lookup("team", self.host.get_team_by_name(&settings.default_team).await) {
                Some(team) => team_id = team.id,
                None => {
                    let reason = format!("no team named {} exists", settings.default_team);
                    return Err(unresolved(reason));
                }
            }
        }

        let mut channel_id = String::new();
        if !settings.default_channel.is_empty() {
            match lookup(
                "channel",
                self.host.get_channel_by_name(&team_id, &settings.default_channel).await,
            ) {
                Some(channel) => channel_id = channel.id,
                None => {
                    return Err(unresolved(format!(
                        "no channel named {} exists in team {}",
                        settings.default_channel, settings.default_team
                    )));
                }
            }
        }

        Ok(ResolvedConfig {
            team_id,
            channel_id,
            bot_user_id: user.id,
            ..ResolvedConfig::new(settings, links)
        })
    }

    /// Handle one webhook call.
    ///
    /// Checks run in a fixed order and the first failure ends the request.
    pub async fn notify(&self, query: &NotifyQuery, body: &[u8]) -> Result<(), NotifyError> {
        let config = self.config.snapshot();

        if !authenticated(&query.auth, &config.settings.secret) {
            tracing::warn!("Unauthenticated matterbar webhook request");
            return Err(NotifyError::AuthFailure);
        }

        if config.team_id.is_empty() && query.team.is_empty() {
            tracing::warn!("Default team not configured; expected team name in query param");
            return Err(NotifyError::MissingParameter("team"));
        }

        if config.channel_id.is_empty() && query.channel.is_empty() {
            tracing::warn!("Default channel not configured; expected channel name in query param");
            return Err(NotifyError::MissingParameter("channel"));
        }

        let team_id = if query.team.is_empty() {
            config.team_id.clone()
        } else {
            match lookup("team", self.host.get_team_by_name(&query.team).await) {
                Some(team) => team.id,
                None => {
                    let err = NotifyError::team_not_found(&query.team);
                    tracing::warn!("{}", err);
                    return Err(err);
                }
            }
        };

        let channel_id = if query.channel.is_empty() {
            config.channel_id.clone()
        } else {
            match lookup("channel", self.host.get_channel_by_name(&team_id, &query.channel).await) {
                Some(channel) => channel.id,
                None => {
                    let err = NotifyError::channel_not_found(&query.channel);
                    tracing::warn!("{}", err);
                    return Err(err);
                }
            }
        };

        let event = Event::from_slice(body).map_err(|e| {
            tracing::error!(error = %e, "Error in json decoding webhook");
            e
        })?;

        let mentions = self.mentions.load_lenient(&channel_id).await;

        if let Some(occurrence) = event.occurrence() {
            if occurrence.exception == ExceptionSource::Missing {
                tracing::warn!(
                    event = %event.kind,
                    link = event.url.as_deref().unwrap_or_default(),
                    "No exception message found"
                );
            }
        }

        let post = config
            .formatter
            .post(&event, &mentions, &channel_id, &config.bot_user_id);

        self.host.create_post(&post).await.map_err(|e| {
            tracing::error!(error = %e, channel_id = %channel_id, "Error creating a post");
            NotifyError::DownstreamPostFailure(e.to_string())
        })?;

        tracing::debug!(event = %event.kind, channel_id = %channel_id, "Posted webhook");
        Ok(())
    }
}

/// Constant-time comparison of the presented token against the secret. An
/// empty secret matches nothing.
fn authenticated(presented: &str, secret: &str) -> bool {
    !secret.is_empty() && bool::from(presented.as_bytes().ct_eq(secret.as_bytes()))
}

/// Host errors on lookups are logged and treated as "not found".
fn lookup<T>(kind: &str, result: Result<Option<T>, HostError>) -> Option<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!(kind, error = %e, "Host lookup failed");
        None
    })
}

fn unresolved(reason: String) -> ConfigError {
    tracing::warn!("Configuration invalid: {}", reason);
    ConfigError::Unresolved(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Attachment;
    use crate::host::MemoryHost;

    const NEW_ITEM: &str = include_str!("../../tests/fixtures/new_item.json");
    const TEST_EVENT: &str = include_str!("../../tests/fixtures/test.json");

    fn settings() -> PluginSettings {
        PluginSettings {
            default_team: "eng".to_string(),
            default_channel: "alerts".to_string(),
            secret: "abc123".to_string(),
            ..Default::default()
        }
    }

    fn host() -> MemoryHost {
        MemoryHost::new()
            .with_team("eng", "team-1")
            .with_team("ops", "team-2")
            .with_channel("team-1", "alerts", "chan-1")
            .with_channel("team-2", "pager", "chan-2")
            .with_user("eric", "user-eric")
    }

    async fn relay_with(host: Arc<MemoryHost>) -> Relay {
        let relay = Relay::new(host, settings(), LinkTemplates::default());
        relay.on_activate().await.unwrap();
        relay
            .on_configuration_change(settings(), LinkTemplates::default())
            .await
            .unwrap();
        relay
    }

    fn query(auth: &str, team: &str, channel: &str) -> NotifyQuery {
        NotifyQuery {
            auth: auth.to_string(),
            team: team.to_string(),
            channel: channel.to_string(),
        }
    }

    #[tokio::test]
    async fn test_activation_and_resolution() {
        let host = Arc::new(host());
        let relay = relay_with(host).await;
        let config = relay.config();

        assert_eq!(config.team_id, "team-1");
        assert_eq!(config.channel_id, "chan-1");
        assert_eq!(config.bot_user_id, "rollbar-bot-id");
    }

    #[tokio::test]
    async fn test_unresolvable_config_keeps_previous() {
        let host = Arc::new(host());
        let relay = relay_with(host).await;

        let bad = PluginSettings {
            default_team: "missing".to_string(),
            ..settings()
        };
        let err = relay
            .on_configuration_change(bad, LinkTemplates::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::Unresolved(_)));
        assert_eq!(relay.config().team_id, "team-1");
    }

    #[tokio::test]
    async fn test_missing_bot_user_is_unresolved() {
        let relay = Relay::new(Arc::new(host()), settings(), LinkTemplates::default());
        let err = relay
            .on_configuration_change(settings(), LinkTemplates::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no user with Username rollbar exists"));
    }

    #[tokio::test]
    async fn test_notify_posts_to_default_channel() {
        let host = Arc::new(host());
        let relay = relay_with(host.clone()).await;

        relay
            .notify(&query("abc123", "", ""), NEW_ITEM.as_bytes())
            .await
            .unwrap();

        let posts = host.posts().await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].channel_id, "chan-1");
        assert_eq!(posts[0].user_id, "rollbar-bot-id");

        let attachments: Vec<Attachment> = posts[0].attachments();
        assert_eq!(attachments[0].color.as_deref(), Some("#ff0000"));
        assert_eq!(attachments[0].pretext, None);
    }

    #[tokio::test]
    async fn test_notify_query_overrides_defaults() {
        let host = Arc::new(host());
        let relay = relay_with(host.clone()).await;

        relay
            .notify(&query("abc123", "ops", "pager"), TEST_EVENT.as_bytes())
            .await
            .unwrap();

        let posts = host.posts().await;
        assert_eq!(posts[0].channel_id, "chan-2");
        assert_eq!(posts[0].message, "Test message from Rollbar");
    }

    #[tokio::test]
    async fn test_notify_includes_mentions() {
        let host = Arc::new(host());
        let relay = relay_with(host.clone()).await;
        host.kv_set("chan-1", br#"{"eric":true,"daniel":true}"#).await.unwrap();

        relay
            .notify(&query("abc123", "", ""), NEW_ITEM.as_bytes())
            .await
            .unwrap();

        let attachments = host.posts().await[0].attachments();
        assert_eq!(attachments[0].pretext.as_deref(), Some("@daniel, @eric"));
    }

    #[tokio::test]
    async fn test_notify_check_order() {
        let host = Arc::new(MemoryHost::new().with_team("eng", "team-1"));
        let relay = Relay::new(
            host.clone(),
            PluginSettings {
                secret: "abc123".to_string(),
                ..Default::default()
            },
            LinkTemplates::default(),
        );

        let cases = [
            (query("wrong", "", ""), "Unauthenticated."),
            (query("", "", ""), "Unauthenticated."),
            (query("abc123", "", "alerts"), "Missing 'team' query parameter."),
            (query("abc123", "eng", ""), "Missing 'channel' query parameter."),
            (query("abc123", "nope", "alerts"), "Team 'nope' does not exist."),
            (query("abc123", "eng", "nope"), "Channel 'nope' does not exist."),
        ];

        for (query, expected) in cases {
            let err = relay.notify(&query, b"not json").await.unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
        assert!(host.posts().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_secret_rejects_everything() {
        let host = Arc::new(host());
        let relay = Relay::new(host, PluginSettings::default(), LinkTemplates::default());

        let err = relay.notify(&query("", "eng", "alerts"), NEW_ITEM.as_bytes()).await.unwrap_err();
        assert!(matches!(err, NotifyError::AuthFailure));
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let host = Arc::new(host());
        let relay = relay_with(host.clone()).await;

        let err = relay.notify(&query("abc123", "", ""), b"{").await.unwrap_err();
        assert!(matches!(err, NotifyError::MalformedPayload(_)));

        let err = relay
            .notify(&query("abc123", "", ""), br#"{"data": {}}"#)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("event_name"));
        assert!(host.posts().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_mentions_do_not_fail() {
        let host = Arc::new(host());
        let relay = relay_with(host.clone()).await;
        host.kv_set("chan-1", b"not json").await.unwrap();

        relay
            .notify(&query("abc123", "", ""), NEW_ITEM.as_bytes())
            .await
            .unwrap();

        let attachments = host.posts().await[0].attachments();
        assert_eq!(attachments[0].pretext, None);
    }

    #[tokio::test]
    async fn test_post_failure_is_downstream_error() {
        let host = Arc::new(host().with_failing_posts("channel is archived"));
        let relay = relay_with(host).await;

        let err = relay
            .notify(&query("abc123", "", ""), NEW_ITEM.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::DownstreamPostFailure(_)));
        assert!(err.to_string().contains("channel is archived"));
    }

    #[test]
    fn test_query_first_value_wins() {
        let pairs = [("auth", "a"), ("auth", "b"), ("channel", "alerts"), ("x", "y")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        assert_eq!(NotifyQuery::from_pairs(pairs), query("a", "", "alerts"));
    }

    #[test]
    fn test_authenticated() {
        assert!(authenticated("abc123", "abc123"));
        assert!(!authenticated("abc12", "abc123"));
        assert!(!authenticated("", ""));
    }
}
