//! The chat host the relay posts into.
//!
//! The relay never talks to a chat server directly; it goes through
//! [`HostApi`], injected at start-up. Two implementations ship:
//!
//! | Host             | Backing                            | Used by           |
//! |------------------|------------------------------------|-------------------|
//! | `MattermostHost` | Mattermost REST API v4 + JSON file | `matterbar serve` |
//! | `MemoryHost`     | in-process maps                    | tests             |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::format::Post;

pub mod mattermost;
pub mod memory;
pub mod store;

pub use mattermost::MattermostHost;
pub use memory::MemoryHost;
pub use store::FileKvStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub team_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Bot account the relay posts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSpec {
    pub username: String,
    pub display_name: String,
    pub description: String,
}

impl BotSpec {
    pub fn rollbar(username: &str) -> Self {
        Self {
            username: username.to_string(),
            display_name: "Rollbar".to_string(),
            description: "Rollbar->Mattermost webhook bot created by the Matterbar relay."
                .to_string(),
        }
    }
}

/// Operations the relay needs from the chat server.
///
/// Lookups return `Ok(None)` when the named object does not exist.
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, HostError>;

    async fn get_channel_by_name(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<Channel>, HostError>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, HostError>;

    /// Make sure the bot account exists and return its user id.
    async fn ensure_bot(&self, bot: &BotSpec) -> Result<String, HostError>;

    async fn create_post(&self, post: &Post) -> Result<(), HostError>;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError>;

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError>;
}
