//! File-backed key-value store.
//!
//! Mattermost exposes no plugin key-value store to external services, so
//! `MattermostHost` keeps its entries in a single JSON document on disk. The
//! whole document is rewritten on every set, through a temporary file and a
//! rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use crate::error::HostError;

pub struct FileKvStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileKvStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| HostError::Store(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(HostError::Store(format!("{}: {}", path.display(), e))),
        };

        tracing::debug!(path = %path.display(), "Opened key-value store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|value| value.as_bytes().to_vec())
    }

    /// Values must be UTF-8.
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        let value = String::from_utf8(value.to_vec())
            .map_err(|e| HostError::Store(format!("value for {} is not UTF-8: {}", key, e)))?;

        // The lock is held across the write so concurrent sets cannot reorder.
        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);

        self.persist(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), HostError> {
        let contents = serde_json::to_vec_pretty(entries)
            .map_err(|e| HostError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| HostError::Store(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HostError::Store(format!("{}: {}", self.path.display(), e)))
    }
}
