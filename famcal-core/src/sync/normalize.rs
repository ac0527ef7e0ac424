//! Identity assignment and conversion of feed occurrences into stored events.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::event::{EventOrigin, StoredEvent, full_event_id};
use crate::feed::RawEvent;
use crate::month::MonthKey;
use crate::sync::recurrence::{Occurrence, expand_event};
use crate::sync::timezone::TimeNormalization;
use crate::sync::window::SyncWindow;

/// A feed occurrence ready to be reconciled into its month bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub base_id: String,
    pub full_id: String,
    pub month: MonthKey,
    /// Calendar-sourced fields only; app-owned fields are empty
    pub event: StoredEvent,
}

/// Logical identity of a feed event.
///
/// The UID when the feed provides one. Otherwise the slugged summary, which
/// changes whenever the title does; anything attached to the old title's
/// occurrences stays behind on records the next sync deletes.
pub fn base_id_for(raw: &RawEvent) -> String {
    if let Some(uid) = &raw.uid {
        return uid.clone();
    }

    let slug = slug::slugify(&raw.summary);
    let base = if slug.is_empty() { "untitled".to_string() } else { slug };
    warn!(
        summary = %raw.summary,
        base_id = %base,
        "Event has no UID; identity falls back to its summary"
    );
    base
}

/// Turn one occurrence of a feed event into its stored form.
pub fn normalize(raw: &RawEvent, base_id: &str, occurrence: &Occurrence) -> NormalizedEvent {
    let part_of_series = raw.is_recurring() || raw.recurrence_id.is_some();

    let event = StoredEvent {
        title: raw.summary.clone(),
        description: raw.description.clone(),
        location: raw.location.clone(),
        start_time: occurrence.start,
        end_time: occurrence.end,
        is_all_day: raw.date_only(),
        origin: EventOrigin::Feed,
        recurring_event_id: part_of_series.then(|| base_id.to_string()),
        activities: Vec::new(),
        reminders: None,
    };

    NormalizedEvent {
        base_id: base_id.to_string(),
        full_id: full_event_id(base_id, occurrence.start),
        month: MonthKey::of(occurrence.start),
        event,
    }
}

/// Expand and normalize every event of a parsed feed.
///
/// Events whose start cannot be resolved or whose rule cannot be evaluated
/// are logged and skipped; the rest of the feed still syncs.
pub fn normalize_feed(
    events: &[RawEvent],
    normalization: TimeNormalization,
    window: &SyncWindow,
) -> Vec<NormalizedEvent> {
    let base_ids: Vec<String> = events.iter().map(base_id_for).collect();

    // Occurrences replaced (or cancelled) by RECURRENCE-ID instances, per series
    let mut overridden: HashMap<&str, HashSet<DateTime<Utc>>> = HashMap::new();
    for (raw, base_id) in events.iter().zip(&base_ids) {
        if let Some(recurrence_id) = &raw.recurrence_id {
            if let Some(resolved) = normalization.normalize_to_utc(recurrence_id) {
                overridden
                    .entry(base_id.as_str())
                    .or_default()
                    .insert(resolved.utc);
            }
        }
    }

    let no_overrides = HashSet::new();
    let mut normalized = Vec::new();
    let mut skipped = 0usize;

    for (raw, base_id) in events.iter().zip(&base_ids) {
        if raw.cancelled {
            debug!(event = raw.label(), "Skipping cancelled event");
            continue;
        }

        let overrides = if raw.is_recurring() {
            overridden.get(base_id.as_str()).unwrap_or(&no_overrides)
        } else {
            &no_overrides
        };

        match expand_event(raw, normalization, window, overrides) {
            Ok(occurrences) => {
                normalized.extend(occurrences.iter().map(|occ| normalize(raw, base_id, occ)));
            }
            Err(e) => {
                skipped += 1;
                warn!(event = raw.label(), error = %e, "Skipping event");
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, "Some feed events could not be expanded");
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedTime, parse_feed};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn raw(uid: Option<&str>, summary: &str, start: DateTime<Utc>) -> RawEvent {
        RawEvent {
            uid: uid.map(String::from),
            summary: summary.to_string(),
            description: Some("Bring water".to_string()),
            location: Some("Field 2".to_string()),
            start: FeedTime::DateTimeUtc(start),
            end: Some(FeedTime::DateTimeUtc(start + Duration::hours(2))),
            duration: None,
            rrule: None,
            exdates: Vec::new(),
            recurrence_id: None,
            cancelled: false,
        }
    }

    #[test]
    fn test_uid_becomes_base_id() {
        let event = raw(Some("match-17@club"), "Away game", utc(2025, 3, 8, 13));
        assert_eq!(base_id_for(&event), "match-17@club");
    }

    #[test]
    fn test_summary_fallback_for_missing_uid() {
        let event = raw(None, "Away Game: Lions vs. Bears", utc(2025, 3, 8, 13));
        assert_eq!(base_id_for(&event), "away-game-lions-vs-bears");

        let untitled = raw(None, "!!!", utc(2025, 3, 8, 13));
        assert_eq!(base_id_for(&untitled), "untitled");
    }

    #[test]
    fn test_normalize_assigns_full_id_and_month() {
        let start = utc(2025, 3, 31, 23);
        let event = raw(Some("abc123"), "Late game", start);
        let occurrence = Occurrence {
            start,
            end: start + Duration::hours(2),
        };

        let normalized = normalize(&event, "abc123", &occurrence);

        assert_eq!(normalized.full_id, format!("abc123-{}", start.timestamp_millis()));
        assert_eq!(normalized.month.to_string(), "2025-03");
        assert_eq!(normalized.event.origin, EventOrigin::Feed);
        assert_eq!(normalized.event.location.as_deref(), Some("Field 2"));
        assert_eq!(normalized.event.recurring_event_id, None);
        assert!(normalized.event.activities.is_empty());
    }

    /// Counts `warn!` events carrying a `summary` field.
    struct SummaryFallbackCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for SummaryFallbackCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let meta = event.metadata();
            if *meta.level() == tracing::Level::WARN && meta.fields().field("summary").is_some() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_summary_fallback_is_reported_once_per_event() {
        let mut master = raw(None, "Swim practice", utc(2025, 3, 3, 9));
        master.rrule = Some("FREQ=WEEKLY;COUNT=3".to_string());
        let mut moved = raw(None, "Swim practice", utc(2025, 3, 11, 9));
        moved.recurrence_id = Some(FeedTime::DateTimeUtc(utc(2025, 3, 10, 9)));
        let window = SyncWindow::around(utc(2025, 3, 1, 0), 0, 0);

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber =
            tracing_subscriber::registry().with(SummaryFallbackCounter(warnings.clone()));
        let normalized = tracing::subscriber::with_default(subscriber, || {
            normalize_feed(&[master, moved], TimeNormalization::AsParsed, &window)
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 2);
        let starts: Vec<_> = normalized.iter().map(|n| n.event.start_time).collect();
        assert_eq!(
            starts,
            vec![utc(2025, 3, 3, 9), utc(2025, 3, 17, 9), utc(2025, 3, 11, 9)]
        );
        assert!(normalized.iter().all(|n| n.base_id == "swim-practice"));
    }

    #[test]
    fn test_normalize_feed_applies_overrides_and_skips_bad_rules() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:abc123
SUMMARY:Swim practice
DTSTART:20250303T090000Z
DTEND:20250303T100000Z
RRULE:FREQ=WEEKLY;COUNT=4
END:VEVENT
BEGIN:VEVENT
UID:abc123
RECURRENCE-ID:20250310T090000Z
SUMMARY:Swim practice (moved)
DTSTART:20250311T090000Z
DTEND:20250311T100000Z
END:VEVENT
BEGIN:VEVENT
UID:abc123
RECURRENCE-ID:20250317T090000Z
SUMMARY:Swim practice
DTSTART:20250317T090000Z
DTEND:20250317T100000Z
STATUS:CANCELLED
END:VEVENT
BEGIN:VEVENT
UID:broken
SUMMARY:Bad rule
DTSTART:20250303T090000Z
RRULE:FREQ=NEVER
END:VEVENT
END:VCALENDAR"#;
        let events = parse_feed(ics).unwrap();
        let window = SyncWindow::around(utc(2025, 3, 1, 0), 0, 0);

        let normalized = normalize_feed(&events, TimeNormalization::AsParsed, &window);

        let mut starts: Vec<(String, DateTime<Utc>)> = normalized
            .iter()
            .map(|n| (n.event.title.clone(), n.event.start_time))
            .collect();
        starts.sort_by_key(|(_, s)| *s);
        assert_eq!(
            starts,
            vec![
                ("Swim practice".to_string(), utc(2025, 3, 3, 9)),
                ("Swim practice (moved)".to_string(), utc(2025, 3, 11, 9)),
                ("Swim practice".to_string(), utc(2025, 3, 24, 9)),
            ]
        );
        assert!(normalized.iter().all(|n| n.base_id == "abc123"));
        assert!(
            normalized
                .iter()
                .all(|n| n.event.recurring_event_id.as_deref() == Some("abc123"))
        );
    }
}
