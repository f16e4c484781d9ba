//! Normalized Rollbar events.
//!
//! [`Event::from_payload`] resolves the shape questions of the raw webhook
//! once, up front: which occurrence record applies, which exception
//! representation applies, and which detail variant the event carries. The
//! formatter only ever sees the result.

use std::fmt;

use chrono::{TimeZone, Utc};
use serde_json::Number;

use super::payload::{BodyPayload, DeployPayload, OccurrencePayload, WebhookPayload};
use crate::error::NotifyError;

/// Rollbar webhook event names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewItem,
    Occurrence,
    ReactivatedItem,
    ReopenedItem,
    ResolvedItem,
    ExpRepeatItem,
    ItemVelocity,
    Deploy,
    Test,
    Other(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "new_item" => EventKind::NewItem,
            "occurrence" => EventKind::Occurrence,
            "reactivated_item" => EventKind::ReactivatedItem,
            "reopened_item" => EventKind::ReopenedItem,
            "resolved_item" => EventKind::ResolvedItem,
            "exp_repeat_item" => EventKind::ExpRepeatItem,
            "item_velocity" => EventKind::ItemVelocity,
            "deploy" => EventKind::Deploy,
            "test" => EventKind::Test,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::NewItem => "new_item",
            EventKind::Occurrence => "occurrence",
            EventKind::ReactivatedItem => "reactivated_item",
            EventKind::ReopenedItem => "reopened_item",
            EventKind::ResolvedItem => "resolved_item",
            EventKind::ExpRepeatItem => "exp_repeat_item",
            EventKind::ItemVelocity => "item_velocity",
            EventKind::Deploy => "deploy",
            EventKind::Test => "test",
            EventKind::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One webhook call, normalized.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,

    /// Occurrence count reached; only meaningful for `exp_repeat_item`.
    pub occurrence_count: u64,

    pub item_id: Option<u64>,
    pub counter: Option<u64>,

    /// Rollbar's own link to the item, when the payload carries one.
    pub url: Option<String>,

    pub detail: EventDetail,
}

/// The event-specific part of an [`Event`], selected by its kind.
#[derive(Debug, Clone)]
pub enum EventDetail {
    /// Item events and `occurrence`.
    Occurrence(OccurrenceRecord),
    Deploy(DeployRecord),
    /// `item_velocity` carries no occurrence data.
    Velocity(Trigger),
    Test { message: String },
}

#[derive(Debug, Clone, Default)]
pub struct OccurrenceRecord {
    pub environment: String,
    pub framework: String,
    pub language: String,
    pub level: String,
    pub uuid: String,
    pub exception: ExceptionSource,
    pub customer_timestamp: Option<Number>,
}

/// Where the human-readable exception text comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExceptionSource {
    Trace { class: String, message: String },
    /// Entry 0 of the trace chain.
    TraceChain { class: String, message: String },
    Message(String),
    #[default]
    Missing,
}

impl ExceptionSource {
    /// Picks the first applicable representation: a single trace with a
    /// message, then the most recent trace of a chain, then a plain message.
    pub fn resolve(body: Option<&BodyPayload>) -> Self {
        let Some(body) = body else {
            return ExceptionSource::Missing;
        };

        if let Some(exception) = body.trace.as_ref().and_then(|t| t.exception.as_ref()) {
            let message = exception.message.clone().unwrap_or_default();
            if !message.is_empty() {
                return ExceptionSource::Trace {
                    class: exception.class.clone().unwrap_or_default(),
                    message,
                };
            }
        }

        let first = body.trace_chain.as_ref().and_then(|chain| chain.first());
        if let Some(exception) = first.and_then(|entry| entry.exception.as_ref()) {
            let message = exception.message.clone().unwrap_or_default();
            if !message.is_empty() {
                return ExceptionSource::TraceChain {
                    class: exception.class.clone().unwrap_or_default(),
                    message,
                };
            }
        }

        match body.message.as_ref().and_then(|m| m.body.as_deref()) {
            Some(text) if !text.is_empty() => ExceptionSource::Message(text.to_string()),
            _ => ExceptionSource::Missing,
        }
    }

    /// Rendered exception text; empty when nothing was found.
    pub fn text(&self) -> String {
        match self {
            ExceptionSource::Trace { class, message }
            | ExceptionSource::TraceChain { class, message } => format!("{}: {}", class, message),
            ExceptionSource::Message(body) => body.clone(),
            ExceptionSource::Missing => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub threshold: u64,
    pub window_size: Option<u64>,
    pub window_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRecord {
    pub id: u64,
    pub environment: String,
    pub revision: String,
    /// Unix seconds.
    pub finish_time: i64,
    pub local_username: Option<String>,
}

impl DeployRecord {
    fn from_payload(deploy: DeployPayload) -> Self {
        Self {
            id: deploy.id.unwrap_or_default(),
            environment: deploy.environment.unwrap_or_default(),
            revision: deploy.revision.unwrap_or_default(),
            finish_time: deploy.finish_time.unwrap_or_default(),
            local_username: deploy.local_username.filter(|u| !u.is_empty()),
        }
    }

    /// Who deployed, or `"unknown user"`.
    pub fn deploy_user(&self) -> &str {
        self.local_username.as_deref().unwrap_or("unknown user")
    }

    /// Finish time as `2013-10-24 23:07:19 UTC +0000`.
    pub fn deploy_datetime(&self) -> String {
        match Utc.timestamp_opt(self.finish_time, 0).single() {
            Some(finished) => finished.format("%Y-%m-%d %H:%M:%S %Z %z").to_string(),
            None => self.finish_time.to_string(),
        }
    }
}

impl OccurrenceRecord {
    fn from_payload(occurrence: OccurrencePayload, item_environment: Option<&str>) -> Self {
        let exception = ExceptionSource::resolve(occurrence.body.as_ref());
        let environment = occurrence
            .environment
            .filter(|e| !e.is_empty())
            .or_else(|| item_environment.map(str::to_string))
            .unwrap_or_default();

        Self {
            environment,
            framework: occurrence.framework.unwrap_or_default(),
            language: occurrence.language.unwrap_or_default(),
            level: occurrence.level.unwrap_or_default(),
            uuid: occurrence.uuid.unwrap_or_default(),
            exception,
            customer_timestamp: occurrence.metadata.and_then(|m| m.customer_timestamp),
        }
    }

    pub fn exception_text(&self) -> String {
        self.exception.text()
    }
}

impl Event {
    /// Decode and normalize a raw webhook body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, NotifyError> {
        let payload: WebhookPayload = serde_json::from_slice(bytes)
            .map_err(|e| NotifyError::MalformedPayload(e.to_string()))?;
        Ok(Self::from_payload(payload))
    }

    pub fn from_payload(payload: WebhookPayload) -> Self {
        let kind = EventKind::parse(&payload.event_name);
        let mut data = payload.data;
        let mut item = data.item.take().unwrap_or_default();

        let detail = match kind {
            EventKind::Deploy => {
                let deploy = data.deploy.take().unwrap_or_default();
                EventDetail::Deploy(DeployRecord::from_payload(deploy))
            }
            EventKind::ItemVelocity => {
                let trigger = data.trigger.take().unwrap_or_default();
                EventDetail::Velocity(Trigger {
                    threshold: trigger.threshold.unwrap_or_default(),
                    window_size: trigger.window_size,
                    window_description: trigger.window_size_description.unwrap_or_default(),
                })
            }
            EventKind::Test => EventDetail::Test {
                message: data.message.take().unwrap_or_default(),
            },
            _ => {
                let last = item.last_occurrence.take();
                let current = data.occurrence.take();
                let occurrence = if kind == EventKind::Occurrence {
                    current.or(last)
                } else {
                    last.or(current)
                };
                EventDetail::Occurrence(OccurrenceRecord::from_payload(
                    occurrence.unwrap_or_default(),
                    item.environment.as_deref().filter(|e| !e.is_empty()),
                ))
            }
        };

        Self {
            kind,
            occurrence_count: data.occurrences.unwrap_or_default(),
            item_id: item.id,
            counter: item.counter,
            url: data.url.filter(|u| !u.is_empty()),
            detail,
        }
    }

    pub fn occurrence(&self) -> Option<&OccurrenceRecord> {
        match &self.detail {
            EventDetail::Occurrence(record) => Some(record),
            _ => None,
        }
    }

    pub fn deploy(&self) -> Option<&DeployRecord> {
        match &self.detail {
            EventDetail::Deploy(record) => Some(record),
            _ => None,
        }
    }
}
