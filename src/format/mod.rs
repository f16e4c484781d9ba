//! Message formatting.
//!
//! Turns a normalized [`Event`] plus the channel's [`MentionList`] into the
//! post the relay hands to the host. Everything here is a pure function of
//! its inputs.
//!
//! | Detail       | Title link          | Body                         | Fields |
//! |--------------|---------------------|------------------------------|--------|
//! | Occurrence   | item link           | exception text in code block | 4      |
//! | Velocity     | Rollbar URL/counter | fixed placeholder            | none   |
//! | Deploy       | deploy link         | deploy summary line          | none   |
//! | Test         | n/a                 | plain-text post              | n/a    |

pub mod attachment;
pub mod rules;

pub use attachment::{Attachment, AttachmentField, Post, POST_TYPE_ATTACHMENT};
pub use rules::{EventRule, RULES};

use serde::{Deserialize, Serialize};

use crate::mentions::MentionList;
use crate::rollbar::{DeployRecord, Event, EventDetail, OccurrenceRecord};

/// Maximum characters of exception text in the fallback.
pub const FALLBACK_MAX_LENGTH: usize = 500;

/// Maximum characters of exception text in the body.
pub const TEXT_MAX_LENGTH: usize = 6000;

/// Substituted when an occurrence carries no exception text.
pub const MISSING_EXCEPTION_NOTICE: &str =
    "No exception message found in Rollbar webhook. Check server logs for more info.";

pub const VELOCITY_NOTICE: &str =
    "No details available. High occurrence rate rollbar events are minimally supported.";

/// Shorten `input` to `length` characters, marking the cut with `...`.
pub fn truncate(input: &str, length: usize) -> String {
    match input.char_indices().nth(length) {
        Some((cut, _)) => format!("{}...", &input[..cut]),
        None => input.to_string(),
    }
}

fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text)
}

/// Link templates into the Rollbar UI.
///
/// `{uuid}`, `{counter}` and `{id}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTemplates {
    #[serde(default = "default_item_link")]
    pub item: String,

    #[serde(default = "default_occurrence_link")]
    pub occurrence: String,

    /// Used for `item_velocity` when the payload has no `url`.
    #[serde(default = "default_velocity_link")]
    pub velocity: String,

    #[serde(default = "default_deploy_link")]
    pub deploy: String,
}

fn default_item_link() -> String {
    "https://rollbar.com/item/uuid/?uuid={uuid}".to_string()
}

fn default_occurrence_link() -> String {
    "https://rollbar.com/occurrence/uuid/?uuid={uuid}".to_string()
}

fn default_velocity_link() -> String {
    "https://rollbar.com/item/counter/?counter={counter}".to_string()
}

fn default_deploy_link() -> String {
    "https://rollbar.com/deploy/{id}/".to_string()
}

impl Default for LinkTemplates {
    fn default() -> Self {
        Self {
            item: default_item_link(),
            occurrence: default_occurrence_link(),
            velocity: default_velocity_link(),
            deploy: default_deploy_link(),
        }
    }
}

impl LinkTemplates {
    pub fn item(&self, uuid: &str) -> String {
        self.item.replace("{uuid}", uuid)
    }

    pub fn occurrence(&self, uuid: &str) -> String {
        self.occurrence.replace("{uuid}", uuid)
    }

    pub fn velocity(&self, counter: u64) -> String {
        self.velocity.replace("{counter}", &counter.to_string())
    }

    pub fn deploy(&self, id: u64) -> String {
        self.deploy.replace("{id}", &id.to_string())
    }
}

/// Formatter output: an attachment, or plain text for `test` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Attachment(Attachment),
    Text(String),
}

impl Rendered {
    pub fn into_post(self, channel_id: &str, user_id: &str) -> Post {
        match self {
            Rendered::Attachment(attachment) => Post::attachment(channel_id, user_id, attachment),
            Rendered::Text(message) => Post::text(channel_id, user_id, &message),
        }
    }
}

/// Builds chat messages from events.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    links: LinkTemplates,
}

impl Formatter {
    pub fn new(links: LinkTemplates) -> Self {
        Self { links }
    }

    /// Format `event` for a channel whose mention list is `mentions`.
    pub fn format(&self, event: &Event, mentions: &MentionList) -> Rendered {
        let title = rules::title(event);
        let color = rules::color(&event.kind).map(str::to_string);

        let mut attachment = match &event.detail {
            EventDetail::Test { message } => return Rendered::Text(message.clone()),
            EventDetail::Occurrence(record) => self.occurrence_attachment(record, title),
            EventDetail::Velocity(_) => self.velocity_attachment(event, title),
            EventDetail::Deploy(deploy) => self.deploy_attachment(deploy, title),
        };

        attachment.color = color;
        if !mentions.is_empty() {
            attachment.pretext = Some(mentions.to_string());
        }

        Rendered::Attachment(attachment)
    }

    /// Format straight into a post for `channel_id`, authored by `user_id`.
    pub fn post(
        &self,
        event: &Event,
        mentions: &MentionList,
        channel_id: &str,
        user_id: &str,
    ) -> Post {
        self.format(event, mentions).into_post(channel_id, user_id)
    }

    fn occurrence_attachment(&self, record: &OccurrenceRecord, title: String) -> Attachment {
        let item_link = self.links.item(&record.uuid);
        let occurrence_link = self.links.occurrence(&record.uuid);

        let mut text = record.exception_text();
        if text.is_empty() {
            text = MISSING_EXCEPTION_NOTICE.to_string();
        }

        let fields = vec![
            AttachmentField::short("Environment", &record.environment),
            AttachmentField::short("Framework", &record.framework),
            AttachmentField::short("Language", &record.language),
            AttachmentField::short(
                "Links",
                &format!("[Item]({}) | [Occurrence]({})", item_link, occurrence_link),
            ),
        ];

        Attachment {
            fallback: format!(
                "[{}] {} - {}",
                record.environment,
                title,
                truncate(&text, FALLBACK_MAX_LENGTH)
            ),
            title,
            title_link: item_link,
            text: code_block(&truncate(&text, TEXT_MAX_LENGTH)),
            fields,
            ..Default::default()
        }
    }

    fn velocity_attachment(&self, event: &Event, title: String) -> Attachment {
        let title_link = match &event.url {
            Some(url) => url.clone(),
            None => self.links.velocity(event.counter.unwrap_or_default()),
        };

        Attachment {
            fallback: title.clone(),
            title,
            title_link,
            text: code_block(VELOCITY_NOTICE),
            ..Default::default()
        }
    }

    fn deploy_attachment(&self, deploy: &DeployRecord, title: String) -> Attachment {
        let text = format!(
            "`{}` **{}** deployed `{}` revision `{}`",
            deploy.deploy_datetime(),
            deploy.deploy_user(),
            deploy.environment,
            deploy.revision,
        );

        Attachment {
            fallback: format!("[{}] {} - {}", title, deploy.environment, text),
            title,
            title_link: self.links.deploy(deploy.id),
            text,
            ..Default::default()
        }
    }
}
