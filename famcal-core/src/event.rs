//! Persisted event records.
//!
//! A `StoredEvent` mixes two kinds of data. Calendar-sourced fields are
//! rewritten from the feed on every sync. App-owned fields (activities and
//! reminder overrides) are attached by people using the app and are only ever
//! carried forward from a prior record, never derived from feed content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a stored event came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Pulled from an external feed; pruned when the feed stops reporting it.
    Feed,
    /// Created by hand in the app. Untagged legacy records land here too.
    #[default]
    Manual,
    /// Materialized from an event template.
    Template,
}

/// Something a user attached to an event (a workout, a checklist, ...).
///
/// Only `id` is interpreted here; the rest of the record is opaque and
/// round-trips untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Activity {
    pub fn new(id: impl Into<String>) -> Self {
        Activity {
            id: id.into(),
            details: serde_json::Map::new(),
        }
    }
}

/// Per-event reminder override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderConfig {
    pub enabled: bool,
    #[serde(default)]
    pub minutes_before: Vec<i64>,
}

/// An event as persisted inside a month bucket, keyed by its full event ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    // Calendar-sourced
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub origin: EventOrigin,
    /// Base ID of the series this occurrence was expanded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,

    // App-owned
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<ReminderConfig>,
}

impl StoredEvent {
    pub fn is_feed_sourced(&self) -> bool {
        self.origin == EventOrigin::Feed
    }

    /// Copy app-owned fields from a prior record of the same logical event.
    pub fn carry_app_fields_from(&mut self, prior: &StoredEvent) {
        self.activities = prior.activities.clone();
        self.reminders = prior.reminders.clone();
    }
}

/// Build the storage key for an occurrence: `baseId-startMillisUTC`.
pub fn full_event_id(base_id: &str, start: DateTime<Utc>) -> String {
    format!("{}-{}", base_id, start.timestamp_millis())
}

/// Recover the base ID from a full event ID by stripping one trailing `-<digits>`.
///
/// IDs without such a suffix are returned unchanged.
pub fn base_id_of(full_id: &str) -> &str {
    match full_id.rsplit_once('-') {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => full_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_full_id_round_trips_to_base_id() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let id = full_event_id("abc123", start);
        assert_eq!(id, "abc123-1740992400000");
        assert_eq!(base_id_of(&id), "abc123");
    }

    #[test]
    fn test_base_id_strips_only_last_numeric_segment() {
        assert_eq!(base_id_of("match-2024-1740992400000"), "match-2024");
        assert_eq!(base_id_of("uid@example.com-1"), "uid@example.com");
    }

    #[test]
    fn test_base_id_without_suffix_is_unchanged() {
        assert_eq!(base_id_of("no-suffix-here"), "no-suffix-here");
        assert_eq!(base_id_of("plain"), "plain");
        assert_eq!(base_id_of("-123"), "-123");
    }

    #[test]
    fn test_untagged_record_deserializes_as_manual() {
        let json = r#"{
            "title": "Dentist",
            "startTime": "2025-03-03T09:00:00Z",
            "endTime": "2025-03-03T10:00:00Z",
            "activities": [{"id": "w1", "sets": 3}]
        }"#;
        let event: StoredEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.origin, EventOrigin::Manual);
        assert!(!event.is_feed_sourced());
        assert_eq!(event.activities[0].id, "w1");
        assert_eq!(event.activities[0].details["sets"], 3);
    }
}
