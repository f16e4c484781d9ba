//! Helpers for the `matterbar` binary.

use std::path::{Path, PathBuf};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::ConfigError;
use crate::gateway::{LoggingConfig, ServiceConfig};

/// Expand tilde (~) in paths.
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

/// Load the service config at `path`, expanding `~`.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    ServiceConfig::load(expand_path(path))
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; `verbose` forces debug.
pub fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path() {
        let plain = Path::new("/etc/matterbar.json");
        assert_eq!(expand_path(plain), PathBuf::from("/etc/matterbar.json"));

        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(
                expand_path(Path::new("~/matterbar.json")),
                PathBuf::from(home).join("matterbar.json")
            );
        }
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matterbar.json");
        ServiceConfig::for_testing().save(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.plugin.secret, "abc123");
    }
}
