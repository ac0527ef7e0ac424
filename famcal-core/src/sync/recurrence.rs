//! RRULE expansion for recurring events.
//!
//! Expands a recurring feed event into concrete occurrences within a sync
//! window, honoring EXDATEs and skipping instants that the feed overrides with
//! a separate RECURRENCE-ID event.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::feed::{FeedTime, RawEvent};
use crate::sync::timezone::{ResolvedTime, TimeNormalization};
use crate::sync::window::SyncWindow;

/// Most instants a single rule may produce inside one window
const MAX_OCCURRENCES: u16 = 2000;

/// One concrete instance of a possibly-recurring event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Instants a series must not produce on its own.
#[derive(Debug, Default)]
struct Exclusions {
    instants: HashSet<DateTime<Utc>>,
    dates: HashSet<NaiveDate>,
}

impl Exclusions {
    fn excludes(&self, start: DateTime<Utc>, zone: Tz) -> bool {
        self.instants.contains(&start)
            || self
                .dates
                .contains(&start.with_timezone(&zone).date_naive())
    }
}

/// Expand an event into the occurrences whose start lies inside `window`.
///
/// `overridden` holds the UTC instants of occurrences replaced by
/// RECURRENCE-ID events elsewhere in the same feed.
///
/// Non-recurring events yield at most one occurrence. An unusable start time
/// or a rule the evaluator rejects is an error for this event only.
pub fn expand_event(
    event: &RawEvent,
    normalization: TimeNormalization,
    window: &SyncWindow,
    overridden: &HashSet<DateTime<Utc>>,
) -> CoreResult<Vec<Occurrence>> {
    let anchor = normalization.normalize_to_utc(&event.start).ok_or_else(|| {
        CoreError::Recurrence(format!(
            "Start time {} of '{}' does not exist in its timezone",
            event.start,
            event.label()
        ))
    })?;
    let duration = event_duration(event, &anchor, normalization);

    let Some(rrule) = event.rrule.as_deref() else {
        let occurrences = if window.contains(anchor.utc) {
            vec![Occurrence {
                start: anchor.utc,
                end: anchor.utc + duration,
            }]
        } else {
            Vec::new()
        };
        return Ok(occurrences);
    };

    let mut exclusions = Exclusions::default();
    for exdate in &event.exdates {
        match exdate {
            FeedTime::Date(d) => {
                exclusions.dates.insert(*d);
            }
            other => {
                if let Some(resolved) = normalization.normalize_to_utc(other) {
                    exclusions.instants.insert(resolved.utc);
                }
            }
        }
    }
    exclusions.instants.extend(overridden.iter().copied());

    expand_rule(rrule, &anchor, duration, window, &exclusions)
        .map_err(|e| CoreError::Recurrence(format!("'{}': {}", event.label(), e)))
}

/// Duration shared by every occurrence: DTEND - DTSTART, else DURATION,
/// else one day for all-day events and zero for timed ones.
pub fn event_duration(
    event: &RawEvent,
    start: &ResolvedTime,
    normalization: TimeNormalization,
) -> Duration {
    let from_end = event
        .end
        .as_ref()
        .and_then(|end| normalization.normalize_to_utc(end))
        .map(|end| end.utc - start.utc);

    match (from_end, event.duration) {
        (Some(d), _) if d >= Duration::zero() => d,
        (_, Some(d)) if d >= Duration::zero() => d,
        _ if event.date_only() => Duration::days(1),
        _ => Duration::zero(),
    }
}

/// Build an iCalendar-format rule block for the rrule crate parser.
fn build_rrule_string(anchor: &ResolvedTime, rrule: &str) -> String {
    // DTSTART carries the wall-clock zone so the rule follows local time across DST changes
    let dtstart = if anchor.zone == Tz::UTC {
        format!("DTSTART:{}", anchor.utc.format("%Y%m%dT%H%M%SZ"))
    } else {
        format!(
            "DTSTART;TZID={}:{}",
            anchor.zone.name(),
            anchor.local().format("%Y%m%dT%H%M%S")
        )
    };

    format!("{}\nRRULE:{}", dtstart, until_as_utc(rrule, anchor.zone))
}

/// Rewrite a DATE or floating UNTIL as the UTC instant it names in `zone`.
///
/// The evaluator only accepts a UTC UNTIL next to a UTC or TZID DTSTART, while
/// all-day and floating series carry their UNTIL in the same form as DTSTART.
fn until_as_utc(rrule: &str, zone: Tz) -> String {
    rrule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => match until_instant(value, zone) {
                Some(until) => format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")),
                None => part.to_string(),
            },
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn until_instant(value: &str, zone: Tz) -> Option<DateTime<Utc>> {
    if value.ends_with(['Z', 'z']) {
        return None;
    }
    // A DATE bound includes the whole of its last day
    let local = match NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        Ok(dt) => dt,
        Err(_) => NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()?
            .and_hms_opt(23, 59, 59)?,
    };
    let until = zone
        .from_local_datetime(&local)
        .latest()
        .or_else(|| zone.from_local_datetime(&(local + Duration::hours(1))).latest())?;
    Some(until.with_timezone(&Utc))
}

fn expand_rule(
    rrule: &str,
    anchor: &ResolvedTime,
    duration: Duration,
    window: &SyncWindow,
    exclusions: &Exclusions,
) -> Result<Vec<Occurrence>, String> {
    let rrule_str = build_rrule_string(anchor, rrule);
    let rrule_set: RRuleSet = rrule_str
        .parse()
        .map_err(|e| format!("Failed to parse RRULE '{}': {}", rrule, e))?;

    // Widen by a second on each side; the bounds are exclusive.
    let tz = rrule::Tz::UTC;
    let after = (window.start - Duration::seconds(1)).with_timezone(&tz);
    let before = (window.end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(rrule, limit = MAX_OCCURRENCES, "Recurrence expansion hit its limit");
    }

    let mut occurrences: Vec<Occurrence> = result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .filter(|start| window.contains(*start))
        .filter(|start| !exclusions.excludes(*start, anchor.zone))
        .map(|start| Occurrence {
            start,
            end: start + duration,
        })
        .collect();

    occurrences.sort();
    occurrences.dedup_by_key(|o| o.start);

    Ok(occurrences)
}
