//! Per-channel mention lists.
//!
//! Each channel keeps the set of usernames pinged whenever an event is posted
//! there. The set lives in the host key-value store under the channel id, as
//! a JSON object mapping username to `true`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{CommandError, HostError};
use crate::host::HostApi;

/// Sorted, de-duplicated usernames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionList {
    users: BTreeSet<String>,
}

impl MentionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the stored `{"username": true}` object. Entries set to `false`
    /// are dropped.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let stored: HashMap<String, bool> = serde_json::from_slice(bytes)?;
        Ok(stored
            .into_iter()
            .filter_map(|(user, notify)| notify.then_some(user))
            .collect())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let stored: BTreeMap<&str, bool> = self.users.iter().map(|u| (u.as_str(), true)).collect();
        serde_json::to_vec(&stored)
    }

    /// Returns `false` if the user was already present.
    pub fn insert(&mut self, username: &str) -> bool {
        self.users.insert(username.to_string())
    }

    /// Returns `false` if the user was not present.
    pub fn remove(&mut self, username: &str) -> bool {
        self.users.remove(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for MentionList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            users: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// `@alice, @bob`, or `None` when empty.
impl fmt::Display for MentionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.users.is_empty() {
            return f.write_str("None");
        }

        for (i, user) in self.users.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "@{}", user)?;
        }
        Ok(())
    }
}

/// Reads and writes mention lists through the host key-value store.
#[derive(Clone)]
pub struct MentionStore {
    host: Arc<dyn HostApi>,
}

impl MentionStore {
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self { host }
    }

    /// Load a channel's list, failing on store errors or corrupt data.
    pub async fn load(&self, channel_id: &str) -> Result<MentionList, CommandError> {
        match self.host.kv_get(channel_id).await? {
            Some(bytes) if !bytes.is_empty() => {
                MentionList::from_json(&bytes).map_err(|e| CommandError::CorruptMentions {
                    channel_id: channel_id.to_string(),
                    reason: e.to_string(),
                })
            }
            _ => Ok(MentionList::new()),
        }
    }

    /// Load a channel's list for posting. Failures are logged and yield an
    /// empty list; they never fail the webhook.
    pub async fn load_lenient(&self, channel_id: &str) -> MentionList {
        match self.load(channel_id).await {
            Ok(list) => list,
            Err(CommandError::CorruptMentions { reason, .. }) => {
                tracing::warn!(channel_id, error = %reason, "Error parsing users to notify");
                MentionList::new()
            }
            Err(e) => {
                tracing::warn!(channel_id, error = %e, "Error fetching users to notify");
                MentionList::new()
            }
        }
    }

    pub async fn save(&self, channel_id: &str, list: &MentionList) -> Result<(), CommandError> {
        let bytes = list
            .to_json()
            .map_err(|e| CommandError::Store(HostError::Store(e.to_string())))?;
        self.host.kv_set(channel_id, &bytes).await?;
        Ok(())
    }
}
