//! Chat attachment and post values handed to the host.
//!
//! Serialized field names follow Mattermost's Slack-compatible attachment
//! schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Post type used for attachment posts.
pub const POST_TYPE_ATTACHMENT: &str = "slack_attachment";

/// One attachment field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    /// A half-width field.
    pub fn short(title: &str, value: &str) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            short: true,
        }
    }
}

/// A richly formatted message block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default)]
    pub fallback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretext: Option<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub title_link: String,

    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

/// What the relay asks the host to post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub channel_id: String,
    pub user_id: String,

    #[serde(default)]
    pub message: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub post_type: String,

    #[serde(default)]
    pub props: BTreeMap<String, Value>,
}

impl Post {
    /// An attachment post marked as webhook-originated.
    pub fn attachment(channel_id: &str, user_id: &str, attachment: Attachment) -> Self {
        let mut post = Self::webhook(channel_id, user_id, String::new());
        post.post_type = POST_TYPE_ATTACHMENT.to_string();
        post.props
            .insert("attachments".to_string(), serde_json::json!([attachment]));
        post
    }

    /// A plain-text post marked as webhook-originated.
    pub fn text(channel_id: &str, user_id: &str, message: &str) -> Self {
        Self::webhook(channel_id, user_id, message.to_string())
    }

    fn webhook(channel_id: &str, user_id: &str, message: String) -> Self {
        let mut props = BTreeMap::new();
        props.insert("from_webhook".to_string(), Value::from("true"));
        props.insert("use_user_icon".to_string(), Value::from("true"));

        Self {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            message,
            post_type: String::new(),
            props,
        }
    }

    /// Attachments carried in `props`, if any.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.props
            .get("attachments")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }
}
