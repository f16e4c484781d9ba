//! Service configuration.
//!
//! One JSON file holds everything `matterbar serve` needs: where to listen,
//! how to reach Mattermost, the relay settings, link templates, the
//! key-value file and logging.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::format::LinkTemplates;
use crate::host::mattermost::MattermostConfig;
use crate::relay::PluginSettings;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub mattermost: MattermostConfig,

    /// Relay settings; re-read on reload.
    #[serde(default)]
    pub plugin: PluginSettings,

    /// Rollbar link templates
    #[serde(default)]
    pub links: LinkTemplates,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Mention list storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding per-channel mention lists
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging format
    #[serde(default)]
    pub json_format: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store_path() -> PathBuf {
    PathBuf::from("matterbar-kv.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        serde_json::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate everything that can be checked without contacting the host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port 0 is valid: the OS assigns one.

        self.plugin.validate()?;

        self.mattermost
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "mattermost".to_string(),
                reason,
            })?;

        for (key, template, placeholder) in [
            ("links.item", &self.links.item, "{uuid}"),
            ("links.occurrence", &self.links.occurrence, "{uuid}"),
            ("links.velocity", &self.links.velocity, "{counter}"),
            ("links.deploy", &self.links.deploy, "{id}"),
        ] {
            if !template.contains(placeholder) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: format!("template must contain {}", placeholder),
                });
            }
        }

        Ok(())
    }

    /// Get the server address string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Create a configuration for testing.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            mattermost: MattermostConfig::new("http://localhost:8065", "test-token"),
            plugin: PluginSettings {
                default_team: "eng".to_string(),
                default_channel: "alerts".to_string(),
                secret: "abc123".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.plugin.username, "rollbar");
        assert_eq!(config.store.path, PathBuf::from("matterbar-kv.json"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServiceConfig::for_testing();
        assert!(config.validate().is_ok());

        config.plugin.secret.clear();
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::for_testing();
        config.plugin.default_team.clear();
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::for_testing();
        config.mattermost.url = "localhost:8065".to_string();
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::for_testing();
        config.links.deploy = "https://rollbar.com/deploy/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_addr() {
        let config = ServiceConfig::default();
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"plugin": {"secret": "s", "default_team": "eng"}, "logging": {"json_format": true}}"#,
        )
        .unwrap();
        assert_eq!(config.plugin.default_team, "eng");
        assert_eq!(config.plugin.username, "rollbar");
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.json_format);
        assert_eq!(config.links, LinkTemplates::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matterbar.json");

        let config = ServiceConfig::for_testing();
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded.plugin, config.plugin);
        assert_eq!(loaded.mattermost, config.mattermost);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServiceConfig::load("/nonexistent/matterbar.json"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
