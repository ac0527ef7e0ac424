//! Events written by people rather than feeds.
//!
//! Manual events and template-generated events use the same
//! `baseId-startMillis` keys as feed occurrences but carry a non-feed
//! origin, so a later sync never prunes them.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::event::{Activity, EventOrigin, ReminderConfig, StoredEvent, full_event_id};
use crate::month::{MonthBucket, MonthKey};
use crate::schedule::parse_time;
use crate::store::{Store, WriteBatch};

#[derive(Debug, Clone, PartialEq)]
pub struct ManualEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub activities: Vec<Activity>,
    pub reminders: Option<ReminderConfig>,
}

impl ManualEvent {
    fn into_stored(self, origin: EventOrigin) -> StoredEvent {
        StoredEvent {
            title: self.title,
            description: self.description,
            location: self.location,
            start_time: self.start,
            end_time: self.end,
            is_all_day: self.is_all_day,
            origin,
            recurring_event_id: None,
            activities: self.activities,
            reminders: self.reminders,
        }
    }
}

/// Add one hand-made event to a calendar. Returns its full event ID.
pub async fn create_manual_event(
    store: &dyn Store,
    calendar_id: &str,
    event: ManualEvent,
) -> CoreResult<String> {
    if event.end < event.start {
        return Err(CoreError::InvalidEvent(format!(
            "'{}' ends before it starts",
            event.title
        )));
    }
    let ids = write_events(store, calendar_id, vec![event.into_stored(EventOrigin::Manual)]).await?;
    Ok(ids.into_iter().next().unwrap_or_default())
}

/// A reusable set of events, stored as TOML.
///
/// ```toml
/// name = "Training week"
///
/// [[items]]
/// title = "Leg day"
/// day_offset = 0
/// start = "07:00"
/// duration = "1h 15m"
/// activities = [{ id = "squat", sets = 5 }]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventTemplate {
    pub name: String,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateItem {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Days after the date the template is applied on
    #[serde(default)]
    pub day_offset: u64,
    /// Local `HH:MM`; omit for an all-day item
    pub start: Option<String>,
    /// humantime duration, ignored for all-day items
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub reminders: Option<ReminderConfig>,
}

fn default_duration() -> String {
    "1h".to_string()
}

impl EventTemplate {
    pub fn from_toml(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::Config(format!("Invalid template: {}", e)))
    }

    pub async fn load(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }
}

impl TemplateItem {
    fn materialize(&self, date: NaiveDate, tz: Tz) -> CoreResult<StoredEvent> {
        let day = date
            .checked_add_days(Days::new(self.day_offset))
            .ok_or_else(|| CoreError::InvalidEvent(format!("'{}' falls outside the calendar", self.title)))?;

        let (start, end, is_all_day) = match &self.start {
            None => {
                let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
                (start, start + chrono::Duration::days(1), true)
            }
            Some(time) => {
                let local = day.and_time(parse_time(time)?);
                let start = tz
                    .from_local_datetime(&local)
                    .earliest()
                    .ok_or_else(|| {
                        CoreError::InvalidEvent(format!("{} does not exist in {}", local, tz))
                    })?
                    .with_timezone(&Utc);
                let duration = humantime::parse_duration(&self.duration)
                    .map_err(|e| CoreError::InvalidEvent(format!("Bad duration '{}': {}", self.duration, e)))?;
                let duration = chrono::Duration::from_std(duration)
                    .map_err(|e| CoreError::InvalidEvent(e.to_string()))?;
                (start, start + duration, false)
            }
        };

        Ok(StoredEvent {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            start_time: start,
            end_time: end,
            is_all_day,
            origin: EventOrigin::Template,
            recurring_event_id: None,
            activities: self.activities.clone(),
            reminders: self.reminders.clone(),
        })
    }
}

/// Materialize a template on `date` (wall-clock times read in `tz`) and
/// write every item in one batch. Returns the new full event IDs.
pub async fn apply_template(
    store: &dyn Store,
    calendar_id: &str,
    template: &EventTemplate,
    date: NaiveDate,
    tz: Tz,
) -> CoreResult<Vec<String>> {
    let events = template
        .items
        .iter()
        .map(|item| item.materialize(date, tz))
        .collect::<CoreResult<Vec<_>>>()?;

    let ids = write_events(store, calendar_id, events).await?;
    info!(calendar_id, template = %template.name, events = ids.len(), "Applied template");
    Ok(ids)
}

async fn write_events(
    store: &dyn Store,
    calendar_id: &str,
    events: Vec<StoredEvent>,
) -> CoreResult<Vec<String>> {
    if store.get_calendar(calendar_id).await?.is_none() {
        return Err(CoreError::CalendarNotFound(calendar_id.to_string()));
    }

    let mut by_month: BTreeMap<MonthKey, Vec<(String, StoredEvent)>> = BTreeMap::new();
    let mut ids = Vec::with_capacity(events.len());
    for event in events {
        let full_id = full_event_id(&Uuid::new_v4().to_string(), event.start_time);
        ids.push(full_id.clone());
        by_month
            .entry(MonthKey::of(event.start_time))
            .or_default()
            .push((full_id, event));
    }

    let now = Utc::now();
    let mut batch = WriteBatch::new(calendar_id);
    for (month, events) in by_month {
        let mut bucket = store
            .load_month(calendar_id, month)
            .await?
            .unwrap_or_else(|| MonthBucket::empty(calendar_id, month));
        bucket.events.extend(events);
        bucket.updated_at = now;
        batch.buckets.push(bucket);
    }

    store.commit(batch).await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Calendar, CalendarSource};
    use crate::event::base_id_of;
    use crate::store::MemoryStore;

    async fn store() -> MemoryStore {
        MemoryStore::with_calendars([Calendar::new("family", CalendarSource::Local)]).await
    }

    fn dentist() -> ManualEvent {
        let start = Utc.with_ymd_and_hms(2025, 3, 12, 14, 0, 0).unwrap();
        ManualEvent {
            title: "Dentist".into(),
            description: None,
            location: None,
            start,
            end: start + chrono::Duration::minutes(45),
            is_all_day: false,
            activities: Vec::new(),
            reminders: None,
        }
    }

    #[tokio::test]
    async fn test_manual_event_uses_full_id_convention() {
        let store = store().await;
        let id = create_manual_event(&store, "family", dentist()).await.unwrap();

        assert!(id.ends_with("-1741788000000"));
        assert!(Uuid::parse_str(base_id_of(&id)).is_ok());

        let bucket = store
            .load_month("family", "2025-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bucket.events[&id].origin, EventOrigin::Manual);
    }

    #[tokio::test]
    async fn test_manual_event_needs_calendar() {
        let store = store().await;
        let err = create_manual_event(&store, "nope", dentist()).await.unwrap_err();
        assert!(matches!(err, CoreError::CalendarNotFound(_)));
    }

    #[tokio::test]
    async fn test_manual_event_rejects_negative_length() {
        let store = store().await;
        let mut event = dentist();
        event.end = event.start - chrono::Duration::minutes(1);
        assert!(create_manual_event(&store, "family", event).await.is_err());
    }

    const TEMPLATE: &str = r#"
name = "Training week"

[[items]]
title = "Leg day"
start = "07:00"
duration = "1h 15m"
activities = [{ id = "squat", sets = 5 }]

[[items]]
title = "Rest"
day_offset = 3
"#;

    #[tokio::test]
    async fn test_template_materializes_in_timezone_across_months() {
        let store = store().await;
        let template = EventTemplate::from_toml(TEMPLATE).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();

        let ids = apply_template(&store, "family", &template, date, chrono_tz::Europe::Stockholm)
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let march = store
            .load_month("family", "2025-03".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        let leg_day = &march.events[&ids[0]];
        // 07:00 CEST on the day DST starts
        assert_eq!(leg_day.start_time, Utc.with_ymd_and_hms(2025, 3, 30, 5, 0, 0).unwrap());
        assert_eq!(leg_day.end_time - leg_day.start_time, chrono::Duration::minutes(75));
        assert_eq!(leg_day.origin, EventOrigin::Template);
        assert_eq!(leg_day.activities[0].id, "squat");
        assert_eq!(leg_day.activities[0].details["sets"], 5);

        let april = store
            .load_month("family", "2025-04".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        let rest = &april.events[&ids[1]];
        assert!(rest.is_all_day);
        assert_eq!(rest.start_time, Utc.with_ymd_and_hms(2025, 4, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_template_rejects_bad_toml() {
        assert!(EventTemplate::from_toml("items = 3").is_err());
    }
}
