//! Per-event formatting rules.
//!
//! Each known event name owns one row: its attachment color and how its title
//! is built. Layout (fields, body, links) is chosen by the event's detail
//! variant in [`super::Formatter`].

use crate::rollbar::{Event, EventDetail, EventKind};

/// Formatting rule for one event name.
pub struct EventRule {
    pub name: &'static str,
    pub color: Option<&'static str>,
    pub title: fn(&Event) -> String,
}

pub static RULES: [EventRule; 9] = [
    EventRule {
        name: "new_item",
        color: Some("#ff0000"),
        title: new_item_title,
    },
    EventRule {
        name: "occurrence",
        color: Some("#ff0000"),
        title: occurrence_title,
    },
    EventRule {
        name: "reactivated_item",
        color: Some("#ffff00"),
        title: reactivated_title,
    },
    EventRule {
        name: "reopened_item",
        color: Some("#add8e6"),
        title: reopened_title,
    },
    EventRule {
        name: "resolved_item",
        color: Some("#00ff00"),
        title: resolved_title,
    },
    EventRule {
        name: "exp_repeat_item",
        color: Some("#800080"),
        title: exp_repeat_title,
    },
    EventRule {
        name: "item_velocity",
        color: Some("#ffa500"),
        title: velocity_title,
    },
    EventRule {
        name: "deploy",
        color: Some("#4bc6b9"),
        title: deploy_title,
    },
    EventRule {
        name: "test",
        color: None,
        title: test_title,
    },
];

/// Rule row for an event kind; `None` for unrecognized names.
pub fn rule_for(kind: &EventKind) -> Option<&'static EventRule> {
    if matches!(kind, EventKind::Other(_)) {
        return None;
    }
    RULES.iter().find(|rule| rule.name == kind.as_str())
}

pub fn color(kind: &EventKind) -> Option<&'static str> {
    rule_for(kind).and_then(|rule| rule.color)
}

/// Attachment title; unrecognized events are titled with their raw name.
pub fn title(event: &Event) -> String {
    match rule_for(&event.kind) {
        Some(rule) => (rule.title)(event),
        None => event.kind.as_str().to_string(),
    }
}

/// `"error"` → `"Error"`.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn level(event: &Event) -> String {
    capitalize(event.occurrence().map(|o| o.level.as_str()).unwrap_or_default())
}

fn with_level(prefix: &str, event: &Event) -> String {
    format!("{} {}", prefix, level(event)).trim_end().to_string()
}

fn new_item_title(event: &Event) -> String {
    with_level("New", event)
}

fn occurrence_title(event: &Event) -> String {
    with_level("Occurrence -", event)
}

fn reactivated_title(event: &Event) -> String {
    with_level("Reactivated", event)
}

fn reopened_title(event: &Event) -> String {
    with_level("Reopened", event)
}

fn resolved_title(event: &Event) -> String {
    with_level("Resolved", event)
}

fn exp_repeat_title(event: &Event) -> String {
    with_level(&format!("{}th", event.occurrence_count), event)
}

fn velocity_title(event: &Event) -> String {
    match &event.detail {
        EventDetail::Velocity(trigger) => format!(
            "{} occurrences in {}",
            trigger.threshold, trigger.window_description
        ),
        _ => String::new(),
    }
}

fn deploy_title(_event: &Event) -> String {
    "Deploy".to_string()
}

fn test_title(_event: &Event) -> String {
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_named(name: &str) -> Event {
        let json = format!(
            r#"{{"event_name": "{}", "data": {{
                "item": {{"last_occurrence": {{"level": "error"}}}},
                "trigger": {{"threshold": 10, "window_size_description": "5 minutes"}},
                "occurrences": 10
            }}}}"#,
            name
        );
        Event::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_titles() {
        let cases = [
            ("new_item", "New Error"),
            ("occurrence", "Occurrence - Error"),
            ("reactivated_item", "Reactivated Error"),
            ("reopened_item", "Reopened Error"),
            ("resolved_item", "Resolved Error"),
            ("exp_repeat_item", "10th Error"),
            ("item_velocity", "10 occurrences in 5 minutes"),
            ("deploy", "Deploy"),
            ("test", ""),
            ("item_assigned", "item_assigned"),
        ];

        for (name, expected) in cases {
            assert_eq!(title(&event_named(name)), expected, "title for {}", name);
        }
    }

    #[test]
    fn test_colors() {
        let cases = [
            ("new_item", Some("#ff0000")),
            ("occurrence", Some("#ff0000")),
            ("reactivated_item", Some("#ffff00")),
            ("exp_repeat_item", Some("#800080")),
            ("item_velocity", Some("#ffa500")),
            ("reopened_item", Some("#add8e6")),
            ("resolved_item", Some("#00ff00")),
            ("deploy", Some("#4bc6b9")),
            ("test", None),
            ("item_assigned", None),
        ];

        for (name, expected) in cases {
            assert_eq!(color(&EventKind::parse(name)), expected, "color for {}", name);
        }
    }

    #[test]
    fn test_every_rule_name_parses_to_known_kind() {
        for rule in RULES.iter() {
            assert!(!matches!(EventKind::parse(rule.name), EventKind::Other(_)));
        }
    }

    #[test]
    fn test_other_kind_never_matches_rule() {
        // An unrecognized kind cannot borrow a known rule by name collision.
        assert!(rule_for(&EventKind::Other("deploy".to_string())).is_none());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("error"), "Error");
        assert_eq!(capitalize("Warning"), "Warning");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_missing_level_has_no_trailing_space() {
        let event = Event::from_slice(br#"{"event_name": "new_item", "data": {}}"#).unwrap();
        assert_eq!(title(&event), "New");
    }
}
