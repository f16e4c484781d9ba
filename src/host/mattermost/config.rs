//! Mattermost host configuration.

use serde::{Deserialize, Serialize};

/// Connection settings for the Mattermost REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MattermostConfig {
    /// Server base URL, e.g. `https://chat.example.com`.
    #[serde(default)]
    pub url: String,

    /// Bot or personal access token.
    #[serde(default)]
    pub token: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl MattermostConfig {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            url: url.to_string(),
            token: token.to_string(),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Mattermost URL is required".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Mattermost URL must start with http:// or https://".to_string());
        }

        if self.token.is_empty() {
            return Err("Mattermost access token is required".to_string());
        }

        Ok(())
    }
}
