//! In-process host.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BotSpec, Channel, HostApi, Team, User};
use crate::error::HostError;
use crate::format::Post;

/// A host backed by in-memory maps. Teams, channels and users are fixed at
/// construction; posts and key-value entries accumulate.
#[derive(Default)]
pub struct MemoryHost {
    teams: HashMap<String, Team>,
    channels: HashMap<(String, String), Channel>,
    users: RwLock<HashMap<String, User>>,
    kv: RwLock<HashMap<String, Vec<u8>>>,
    posts: RwLock<Vec<Post>>,
    post_failure: Option<String>,
    store_failure: Option<String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(mut self, name: &str, id: &str) -> Self {
        self.teams.insert(
            name.to_string(),
            Team {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_channel(mut self, team_id: &str, name: &str, id: &str) -> Self {
        self.channels.insert(
            (team_id.to_string(), name.to_string()),
            Channel {
                id: id.to_string(),
                name: name.to_string(),
                team_id: team_id.to_string(),
            },
        );
        self
    }

    pub fn with_user(mut self, username: &str, id: &str) -> Self {
        self.users.get_mut().insert(
            username.to_string(),
            User {
                id: id.to_string(),
                username: username.to_string(),
            },
        );
        self
    }

    /// Every `create_post` fails with `message`.
    pub fn with_failing_posts(mut self, message: &str) -> Self {
        self.post_failure = Some(message.to_string());
        self
    }

    /// Every key-value access fails with `message`.
    pub fn with_failing_store(mut self, message: &str) -> Self {
        self.store_failure = Some(message.to_string());
        self
    }

    /// Posts created so far, oldest first.
    pub async fn posts(&self) -> Vec<Post> {
        self.posts.read().await.clone()
    }

    fn check_store(&self) -> Result<(), HostError> {
        match &self.store_failure {
            Some(message) => Err(HostError::Store(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HostApi for MemoryHost {
    async fn get_team_by_name(&self, name: &str) -> Result<Option<Team>, HostError> {
        Ok(self.teams.get(name).cloned())
    }

    async fn get_channel_by_name(
        &self,
        team_id: &str,
        name: &str,
    ) -> Result<Option<Channel>, HostError> {
        Ok(self
            .channels
            .get(&(team_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, HostError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn ensure_bot(&self, bot: &BotSpec) -> Result<String, HostError> {
        let mut users = self.users.write().await;
        let user = users.entry(bot.username.clone()).or_insert_with(|| User {
            id: format!("{}-bot-id", bot.username),
            username: bot.username.clone(),
        });
        Ok(user.id.clone())
    }

    async fn create_post(&self, post: &Post) -> Result<(), HostError> {
        if let Some(message) = &self.post_failure {
            return Err(HostError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        self.posts.write().await.push(post.clone());
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, HostError> {
        self.check_store()?;
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), HostError> {
        self.check_store()?;
        self.kv.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookups() {
        let host = MemoryHost::new()
            .with_team("eng", "team-1")
            .with_channel("team-1", "alerts", "chan-1")
            .with_user("alice", "user-1");

        assert_eq!(host.get_team_by_name("eng").await.unwrap().unwrap().id, "team-1");
        assert!(host.get_team_by_name("ops").await.unwrap().is_none());
        assert_eq!(
            host.get_channel_by_name("team-1", "alerts").await.unwrap().unwrap().id,
            "chan-1"
        );
        assert!(host.get_channel_by_name("team-2", "alerts").await.unwrap().is_none());
        assert_eq!(
            host.get_user_by_username("alice").await.unwrap().unwrap().id,
            "user-1"
        );
    }

    #[tokio::test]
    async fn test_ensure_bot_is_idempotent() {
        let host = MemoryHost::new();
        let bot = BotSpec::rollbar("rollbar");
        let first = host.ensure_bot(&bot).await.unwrap();
        let second = host.ensure_bot(&bot).await.unwrap();
        assert_eq!(first, second);
        assert!(host.get_user_by_username("rollbar").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_posts() {
        let host = MemoryHost::new().with_failing_posts("boom");
        let post = Post::text("chan", "bot", "hi");
        assert!(host.create_post(&post).await.is_err());
        assert!(host.posts().await.is_empty());
    }
}
