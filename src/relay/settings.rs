//! Plugin settings and the active configuration snapshot.
//!
//! Settings change at runtime (on reload), while webhooks and commands read
//! them concurrently. The active configuration is therefore an immutable
//! [`ResolvedConfig`] behind an [`ArcSwap`]: readers take a cheap `Arc`
//! snapshot, writers build a complete replacement and swap it in. A snapshot
//! is never mutated after it is published.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::{Formatter, LinkTemplates};

/// User-facing relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Team posted to when a webhook names none.
    #[serde(default)]
    pub default_team: String,

    /// Channel (within `default_team`) posted to when a webhook names none.
    #[serde(default)]
    pub default_channel: String,

    /// Username of the bot account posts are made as.
    #[serde(default = "default_username")]
    pub username: String,

    /// Shared secret expected in the `auth` query parameter.
    #[serde(default)]
    pub secret: String,

    /// Token Mattermost sends with slash-command requests, if verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_token: Option<String>,
}

fn default_username() -> String {
    "rollbar".to_string()
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            default_team: String::new(),
            default_channel: String::new(),
            username: default_username(),
            secret: String::new(),
            command_token: None,
        }
    }
}

impl PluginSettings {
    /// Checks that need no host access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingRequired("plugin.secret".to_string()));
        }

        if self.username.is_empty() {
            return Err(ConfigError::MissingRequired("plugin.username".to_string()));
        }

        if self.default_team.is_empty() && !self.default_channel.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "plugin.default_channel".to_string(),
                reason: "a default_team must be specified before a default_channel".to_string(),
            });
        }

        Ok(())
    }
}

/// Settings plus the host ids they resolved to.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub settings: PluginSettings,
    pub formatter: Formatter,

    /// Empty when no default team is configured.
    pub team_id: String,

    /// Empty when no default channel is configured.
    pub channel_id: String,

    /// Empty until the relay is activated.
    pub bot_user_id: String,
}

impl ResolvedConfig {
    pub fn new(settings: PluginSettings, links: LinkTemplates) -> Self {
        Self {
            settings,
            formatter: Formatter::new(links),
            ..Default::default()
        }
    }

    /// A copy carrying a different bot user id.
    pub fn with_bot_user_id(&self, bot_user_id: &str) -> Self {
        Self {
            bot_user_id: bot_user_id.to_string(),
            ..self.clone()
        }
    }
}

/// Holder of the active [`ResolvedConfig`].
pub struct ConfigStore {
    current: ArcSwap<ResolvedConfig>,
}

impl ConfigStore {
    pub fn new(initial: ResolvedConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// The active snapshot. Later swaps do not affect it.
    pub fn snapshot(&self) -> Arc<ResolvedConfig> {
        self.current.load_full()
    }

    /// Publish a new snapshot.
    pub fn replace(&self, config: ResolvedConfig) {
        self.current.store(Arc::new(config));
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ResolvedConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> PluginSettings {
        PluginSettings {
            secret: secret.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(PluginSettings::default().validate().is_err());
        assert!(settings("abc123").validate().is_ok());

        let channel_without_team = PluginSettings {
            default_channel: "alerts".to_string(),
            ..settings("abc123")
        };
        assert!(matches!(
            channel_without_team.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_settings_defaults() {
        let parsed: PluginSettings = serde_json::from_str(r#"{"secret": "s"}"#).unwrap();
        assert_eq!(parsed.username, "rollbar");
        assert_eq!(parsed.command_token, None);
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let initial = ResolvedConfig::new(settings("old"), LinkTemplates::default());
        let store = ConfigStore::new(initial);
        let before = store.snapshot();

        store.replace(ResolvedConfig::new(settings("new"), LinkTemplates::default()));

        assert_eq!(before.settings.secret, "old");
        assert_eq!(store.snapshot().settings.secret, "new");
    }

    #[test]
    fn test_with_bot_user_id_copies() {
        let config = ResolvedConfig {
            team_id: "team".to_string(),
            ..ResolvedConfig::new(settings("s"), LinkTemplates::default())
        };
        let updated = config.with_bot_user_id("bot");
        assert_eq!(updated.team_id, "team");
        assert_eq!(updated.bot_user_id, "bot");
        assert!(config.bot_user_id.is_empty());
    }
}
