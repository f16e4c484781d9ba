//! Wire shapes of the Rollbar webhook body.
//!
//! These structs mirror the JSON exactly as Rollbar sends it and tolerate the
//! variations seen across notifier SDKs: every nested object may be absent,
//! strings may be null, and identifiers may arrive as numbers or numeric
//! strings. Unknown fields are ignored. Nothing here makes decisions; see
//! [`super::event`] for the normalized view.

use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

/// Top-level webhook envelope. Both fields are required.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event_name: String,
    pub data: PayloadData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadData {
    pub item: Option<ItemPayload>,

    /// Present instead of `item.last_occurrence` for `occurrence` events.
    pub occurrence: Option<OccurrencePayload>,

    /// Occurrence count reached, for `exp_repeat_item`.
    #[serde(deserialize_with = "lenient_u64")]
    pub occurrences: Option<u64>,

    pub trigger: Option<TriggerPayload>,
    pub deploy: Option<DeployPayload>,

    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,

    /// Body of a `test` event.
    #[serde(deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemPayload {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: Option<u64>,

    #[serde(deserialize_with = "lenient_u64")]
    pub counter: Option<u64>,

    #[serde(deserialize_with = "lenient_string")]
    pub environment: Option<String>,

    pub last_occurrence: Option<OccurrencePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OccurrencePayload {
    pub body: Option<BodyPayload>,

    #[serde(deserialize_with = "lenient_string")]
    pub environment: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub framework: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub language: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub level: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,

    pub metadata: Option<MetadataPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BodyPayload {
    pub trace: Option<TracePayload>,

    /// Most recent trace first.
    pub trace_chain: Option<Vec<TracePayload>>,

    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TracePayload {
    pub exception: Option<ExceptionPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExceptionPayload {
    #[serde(deserialize_with = "lenient_string")]
    pub class: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    #[serde(deserialize_with = "lenient_string")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataPayload {
    /// Integer or decimal depending on the client SDK.
    pub customer_timestamp: Option<Number>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TriggerPayload {
    #[serde(deserialize_with = "lenient_u64")]
    pub threshold: Option<u64>,

    #[serde(deserialize_with = "lenient_u64")]
    pub window_size: Option<u64>,

    #[serde(deserialize_with = "lenient_string")]
    pub window_size_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeployPayload {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: Option<u64>,

    #[serde(deserialize_with = "lenient_string")]
    pub environment: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub revision: Option<String>,

    /// Unix seconds.
    #[serde(deserialize_with = "lenient_i64")]
    pub finish_time: Option<i64>,

    #[serde(deserialize_with = "lenient_string")]
    pub local_username: Option<String>,
}

/// Accepts a number, a numeric string, or null.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_i64(deserializer)?.and_then(|n| u64::try_from(n).ok()))
}

/// Accepts a string or any scalar, rendered as text; objects and arrays are
/// treated as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_requires_event_name_and_data() {
        assert!(serde_json::from_str::<WebhookPayload>("{}").is_err());
        assert!(serde_json::from_str::<WebhookPayload>(r#"{"event_name": "test"}"#).is_err());
        assert!(serde_json::from_str::<WebhookPayload>(r#"{"data": {}}"#).is_err());

        let payload: WebhookPayload =
            serde_json::from_str(r#"{"event_name": "test", "data": {}}"#).unwrap();
        assert_eq!(payload.event_name, "test");
        assert!(payload.data.item.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "event_name": "new_item",
            "data": {"item": {"counter": 4, "framework": 2, "brand_new": {"x": 1}}},
            "extra": [1, 2, 3]
        }"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.data.item.unwrap().counter, Some(4));
    }

    #[test]
    fn test_numeric_strings_and_nulls() {
        let json = r#"{
            "event_name": "deploy",
            "data": {"deploy": {
                "id": "12",
                "finish_time": 1382656039,
                "local_username": null,
                "revision": 42
            }}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        let deploy = payload.data.deploy.unwrap();
        assert_eq!(deploy.id, Some(12));
        assert_eq!(deploy.finish_time, Some(1382656039));
        assert_eq!(deploy.local_username, None);
        assert_eq!(deploy.revision.as_deref(), Some("42"));
    }

    #[test]
    fn test_customer_timestamp_integer_or_decimal() {
        for raw in ["1382656039", "1382656039.125"] {
            let json = format!(
                r#"{{"event_name": "new_item", "data": {{"item": {{"last_occurrence":
                    {{"metadata": {{"customer_timestamp": {}}}}}}}}}}}"#,
                raw
            );
            let payload: WebhookPayload = serde_json::from_str(&json).unwrap();
            let ts = payload
                .data
                .item
                .and_then(|i| i.last_occurrence)
                .and_then(|o| o.metadata)
                .and_then(|m| m.customer_timestamp)
                .unwrap();
            assert_eq!(ts.to_string(), raw);
        }
    }
}
