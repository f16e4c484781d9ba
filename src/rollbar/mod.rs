//! Rollbar webhook payloads.
//!
//! Rollbar posts one JSON document per notification. The document shape
//! depends on the event: item events carry `item.last_occurrence`, the
//! `occurrence` event carries `data.occurrence`, `deploy` carries
//! `data.deploy`, and `item_velocity`/`test` carry neither.
//!
//! ```text
//! raw bytes ──▶ payload::WebhookPayload ──▶ event::Event
//!               (lenient wire shape)        (tagged, resolved)
//! ```

pub mod event;
pub mod payload;

pub use event::{
    DeployRecord, Event, EventDetail, EventKind, ExceptionSource, OccurrenceRecord, Trigger,
};
pub use payload::WebhookPayload;
