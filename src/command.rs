//! The `/rollbar` slash command.
//!
//! Lists, adds or removes the users mentioned on every Rollbar post in the
//! channel the command was issued from. Every response is ephemeral.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::CommandError;
use crate::host::HostApi;
use crate::mentions::{MentionList, MentionStore};

pub const RESPONSE_USERNAME: &str = "Rollbar";
pub const RESPONSE_TYPE_EPHEMERAL: &str = "ephemeral";

const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Check server logs or try again later.";
const USAGE_MESSAGE: &str = "Usage: `/rollbar (notify|remove|list) @username`";

/// Slash-command request as Mattermost posts it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandArgs {
    /// The trigger word, e.g. `/rollbar`.
    #[serde(default)]
    pub command: String,
    /// Everything after the trigger.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub token: String,
}

impl CommandArgs {
    /// The full command line as typed.
    pub fn command_line(&self) -> String {
        if self.text.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_type: String,
    pub text: String,
    pub username: String,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: RESPONSE_TYPE_EPHEMERAL.to_string(),
            text: text.into(),
            username: RESPONSE_USERNAME.to_string(),
        }
    }

    fn users(list: &MentionList) -> Self {
        Self::ephemeral(format!(
            "Users notified on each Rollbar posted to this channel: {}",
            list
        ))
    }
}

/// Check a request token against the configured one, if any.
pub fn verify_token(expected: Option<&str>, presented: &str) -> Result<(), CommandError> {
    match expected {
        None => Ok(()),
        Some(expected) if matches_token(expected, presented) => Ok(()),
        Some(_) => Err(CommandError::Unauthorized),
    }
}

fn matches_token(expected: &str, presented: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

#[derive(Clone)]
pub struct RollbarCommand {
    host: Arc<dyn HostApi>,
    mentions: MentionStore,
}

impl RollbarCommand {
    pub fn new(host: Arc<dyn HostApi>, mentions: MentionStore) -> Self {
        Self { host, mentions }
    }

    /// Run one command. Failures are logged and answered with a generic
    /// message; this never errors.
    pub async fn execute(&self, args: &CommandArgs) -> CommandResponse {
        match self.run(args).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(channel_id = %args.channel_id, error = %e, "Slash command failed");
                CommandResponse::ephemeral(GENERIC_ERROR_MESSAGE)
            }
        }
    }

    async fn run(&self, args: &CommandArgs) -> Result<CommandResponse, CommandError> {
        let line = args.command_line();
        let tokens: Vec<&str> = line.split(' ').collect();

        if tokens.len() < 2 || tokens.len() > 3 {
            return Ok(CommandResponse::ephemeral(USAGE_MESSAGE));
        }

        let mut users = self.mentions.load(&args.channel_id).await?;

        let action = tokens[1];
        match action {
            "list" => {
                if tokens.len() != 2 {
                    return Ok(CommandResponse::ephemeral("Usage: `/rollbar list`"));
                }
                Ok(CommandResponse::users(&users))
            }
            "notify" | "remove" => {
                if tokens.len() != 3 {
                    return Ok(CommandResponse::ephemeral(format!(
                        "Usage: `/rollbar {} @username`",
                        action
                    )));
                }

                let username = tokens[2].strip_prefix('@').unwrap_or(tokens[2]);

                // Lookup errors are indistinguishable from a missing user.
                let user = self.host.get_user_by_username(username).await.unwrap_or_else(|e| {
                    tracing::debug!(username, error = %e, "User lookup failed");
                    None
                });
                if user.is_none() {
                    let text = format!("User `{}` not found.", username);
                    return Ok(CommandResponse::ephemeral(text));
                }

                if action == "notify" {
                    if !users.insert(username) {
                        return Ok(CommandResponse::ephemeral(format!(
                            "User `{}` is already being notified.",
                            username
                        )));
                    }
                } else if !users.remove(username) {
                    return Ok(CommandResponse::ephemeral(format!(
                        "User `{}` is already not being notified.",
                        username
                    )));
                }

                self.mentions.save(&args.channel_id, &users).await?;
                tracing::info!(
                    channel_id = %args.channel_id,
                    action,
                    username,
                    "Updated mention list"
                );
                Ok(CommandResponse::users(&users))
            }
            _ => Ok(CommandResponse::ephemeral(USAGE_MESSAGE)),
        }
    }
}
