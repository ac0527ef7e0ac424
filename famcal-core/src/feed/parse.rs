//! Feed parsing using the icalendar crate's parser.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::feed::raw::{FeedTime, RawEvent};

/// Parse a whole feed document into its VEVENTs.
///
/// A document that is not iCalendar at all is an error. Individual VEVENTs
/// without a usable DTSTART are skipped with a warning.
pub fn parse_feed(content: &str) -> CoreResult<Vec<RawEvent>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.trim_start().starts_with("BEGIN:VCALENDAR") {
        return Err(CoreError::FeedParse(
            "Document does not start with BEGIN:VCALENDAR".to_string(),
        ));
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CoreError::FeedParse(e.to_string()))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let mut events = Vec::with_capacity(vevents.len());
    for vevent in vevents {
        match parse_vevent(vevent) {
            Some(event) => events.push(event),
            None => {
                let uid = vevent.find_prop("UID").map(|p| p.val.to_string());
                warn!(uid = ?uid, "Skipping VEVENT without a usable DTSTART");
            }
        }
    }

    Ok(events)
}

fn collect_vevents<'c, 'a>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component) -> Option<RawEvent> {
    let start = to_feed_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_feed_time);

    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|uid| !uid.is_empty());
    let summary = text_prop(vevent, "SUMMARY").unwrap_or_else(|| "(No title)".to_string());
    let description = text_prop(vevent, "DESCRIPTION");
    let location = text_prop(vevent, "LOCATION");

    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let rrule = vevent
        .find_prop("RRULE")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|r| !r.is_empty());
    let exdates: Vec<FeedTime> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();

    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_feed_time);

    let cancelled = vevent
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED"));

    Some(RawEvent {
        uid,
        summary,
        description,
        location,
        start,
        end,
        duration,
        rrule,
        exdates,
        recurrence_id,
        cancelled,
    })
}

/// Text value with RFC 5545 escapes resolved; empty values count as absent
fn text_prop(vevent: &Component, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.trim().is_empty())
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Convert icalendar's DatePerhapsTime to our FeedTime, preserving timezone info
fn to_feed_time(dpt: DatePerhapsTime) -> FeedTime {
    match dpt {
        DatePerhapsTime::Date(d) => FeedTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => FeedTime::DateTimeUtc(dt),
            CalendarDateTime::Floating(naive) => FeedTime::DateTimeFloating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => FeedTime::DateTimeZoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Parse a DURATION value (`PT1H30M`, `P1D`, ...)
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().trim_start_matches('+');
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// Parse an EXDATE property into a list of FeedTime values.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
fn parse_exdate_property(prop: &Property) -> Vec<FeedTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date || s.len() == 8 {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(FeedTime::Date)
            } else if let Some(utc) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| FeedTime::DateTimeUtc(dt.and_utc()))
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| FeedTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(FeedTime::DateTimeFloating)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date_time(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").unwrap()
    }

    #[test]
    fn test_parse_recurring_event_with_exdates() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:abc123
SUMMARY:Swim practice
LOCATION:Pool\, lane 4
DTSTART:20250303T090000Z
DTEND:20250303T100000Z
RRULE:FREQ=WEEKLY;COUNT=8
EXDATE;TZID=Europe/Stockholm:20250310T100000,20250317T100000
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).expect("Should parse");
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.uid.as_deref(), Some("abc123"));
        assert_eq!(event.summary, "Swim practice");
        assert_eq!(event.location.as_deref(), Some("Pool, lane 4"));
        assert_eq!(
            event.start,
            FeedTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap())
        );
        assert_eq!(event.rrule.as_deref(), Some("FREQ=WEEKLY;COUNT=8"));
        assert_eq!(event.exdates.len(), 2);
        for exdate in &event.exdates {
            match exdate {
                FeedTime::DateTimeZoned { tzid, .. } => assert_eq!(tzid, "Europe/Stockholm"),
                other => panic!("Expected DateTimeZoned, got {:?}", other),
            }
        }
        assert!(!event.cancelled);
    }

    #[test]
    fn test_parse_duration_and_missing_uid() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Home game\r\n\
DTSTART:20250405T140000\r\n\
DURATION:PT1H30M\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let events = parse_feed(ics).expect("Should parse");
        let event = &events[0];
        assert_eq!(event.uid, None);
        assert_eq!(event.end, None);
        assert_eq!(event.duration, Some(Duration::minutes(90)));
        assert_eq!(event.start, FeedTime::DateTimeFloating(date_time("20250405T140000")));
        assert_eq!(event.label(), "Home game");
    }

    #[test]
    fn test_parse_all_day_override_and_cancelled() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:camp
SUMMARY:Camp
DTSTART;VALUE=DATE:20250610
DTEND;VALUE=DATE:20250613
END:VEVENT
BEGIN:VEVENT
UID:abc123
RECURRENCE-ID:20250310T090000Z
SUMMARY:Swim practice
DTSTART:20250310T110000Z
DTEND:20250310T120000Z
STATUS:CANCELLED
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).expect("Should parse");
        assert_eq!(events.len(), 2);
        assert!(events[0].date_only());
        assert_eq!(
            events[0].end,
            Some(FeedTime::Date(NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()))
        );
        assert!(events[1].cancelled);
        assert_eq!(
            events[1].recurrence_id,
            Some(FeedTime::DateTimeUtc(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()))
        );
    }

    #[test]
    fn test_event_without_dtstart_is_skipped() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:broken
SUMMARY:No start
END:VEVENT
BEGIN:VEVENT
UID:ok
SUMMARY:Fine
DTSTART:20250101T100000Z
END:VEVENT
END:VCALENDAR"#;

        let events = parse_feed(ics).expect("Should parse");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid.as_deref(), Some("ok"));
    }

    #[test]
    fn test_non_calendar_document_is_rejected() {
        let err = parse_feed("<html><body>Not found</body></html>").unwrap_err();
        assert!(matches!(err, CoreError::FeedParse(_)));
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text(r"a\, b\; c\nd\\e"), "a, b; c\nd\\e");
    }
}
