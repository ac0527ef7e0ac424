//! Per-source timezone normalization.
//!
//! Feeds disagree about what their wall-clock times mean. Provider exports
//! carry real UTC instants or resolvable TZIDs, while generic subscription
//! feeds often write local times that only make sense in the household's home
//! zone. `CalendarSource::time_normalization` is the one place that decides.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::calendar::CalendarSource;
use crate::feed::FeedTime;

/// How parsed feed times become UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeNormalization {
    /// Trust the feed: UTC stays UTC, TZIDs are resolved, floating times are UTC.
    AsParsed,
    /// Any wall-clock time is read as local time in the given zone.
    HomeZone(Tz),
}

/// A feed time pinned to an instant, plus the zone its wall clock lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    pub utc: DateTime<Utc>,
    /// Zone recurrence rules are evaluated in, so weekly 09:00 stays 09:00 across DST.
    pub zone: Tz,
}

impl ResolvedTime {
    fn utc(utc: DateTime<Utc>) -> Self {
        ResolvedTime {
            utc,
            zone: Tz::UTC,
        }
    }

    /// Wall-clock time in `zone`
    pub fn local(&self) -> NaiveDateTime {
        self.utc.with_timezone(&self.zone).naive_local()
    }
}

impl CalendarSource {
    pub fn time_normalization(&self, home: Tz) -> TimeNormalization {
        match self {
            CalendarSource::Google { .. } => TimeNormalization::AsParsed,
            CalendarSource::Ical { .. } | CalendarSource::Local => TimeNormalization::HomeZone(home),
        }
    }
}

impl TimeNormalization {
    /// Pin a feed time to UTC. Returns `None` for wall-clock times that do
    /// not exist in their zone (DST gaps).
    pub fn normalize_to_utc(&self, time: &FeedTime) -> Option<ResolvedTime> {
        match (self, time) {
            // All-day values are anchored at UTC midnight so they never drift across days.
            (_, FeedTime::Date(d)) => d.and_hms_opt(0, 0, 0).map(|dt| ResolvedTime::utc(dt.and_utc())),
            (_, FeedTime::DateTimeUtc(dt)) => Some(ResolvedTime::utc(*dt)),
            (TimeNormalization::AsParsed, FeedTime::DateTimeFloating(naive)) => {
                Some(ResolvedTime::utc(naive.and_utc()))
            }
            (TimeNormalization::AsParsed, FeedTime::DateTimeZoned { datetime, tzid }) => {
                match tzid.parse::<Tz>() {
                    Ok(tz) => in_zone(tz, datetime),
                    Err(_) => {
                        warn!(%tzid, "Unknown TZID, treating time as UTC");
                        Some(ResolvedTime::utc(datetime.and_utc()))
                    }
                }
            }
            (TimeNormalization::HomeZone(home), FeedTime::DateTimeFloating(naive)) => {
                in_zone(*home, naive)
            }
            (TimeNormalization::HomeZone(home), FeedTime::DateTimeZoned { datetime, .. }) => {
                in_zone(*home, datetime)
            }
        }
    }
}

fn in_zone(tz: Tz, naive: &NaiveDateTime) -> Option<ResolvedTime> {
    // Ambiguous times (DST fall-back) take the earlier instant.
    let local = tz.from_local_datetime(naive).earliest()?;
    Some(ResolvedTime {
        utc: local.with_timezone(&Utc),
        zone: tz,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn ical() -> CalendarSource {
        CalendarSource::Ical {
            url: "https://example.com/a.ics".to_string(),
        }
    }

    fn google() -> CalendarSource {
        CalendarSource::Google {
            external_id: "family".to_string(),
        }
    }

    #[test]
    fn test_ical_reinterprets_wall_clock_in_home_zone() {
        let strategy = ical().time_normalization(chrono_tz::Europe::Stockholm);
        let resolved = strategy
            .normalize_to_utc(&FeedTime::DateTimeFloating(naive(2025, 1, 15, 18, 0)))
            .unwrap();
        assert_eq!(resolved.utc, Utc.with_ymd_and_hms(2025, 1, 15, 17, 0, 0).unwrap());
        assert_eq!(resolved.zone, chrono_tz::Europe::Stockholm);

        // A foreign TZID is ignored in favour of the home zone
        let zoned = strategy
            .normalize_to_utc(&FeedTime::DateTimeZoned {
                datetime: naive(2025, 7, 1, 18, 0),
                tzid: "America/New_York".to_string(),
            })
            .unwrap();
        assert_eq!(zoned.utc, Utc.with_ymd_and_hms(2025, 7, 1, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_google_trusts_parsed_times() {
        let strategy = google().time_normalization(chrono_tz::Europe::Stockholm);
        let floating = strategy
            .normalize_to_utc(&FeedTime::DateTimeFloating(naive(2025, 1, 15, 18, 0)))
            .unwrap();
        assert_eq!(floating.utc, Utc.with_ymd_and_hms(2025, 1, 15, 18, 0, 0).unwrap());
        assert_eq!(floating.zone, Tz::UTC);

        let zoned = strategy
            .normalize_to_utc(&FeedTime::DateTimeZoned {
                datetime: naive(2025, 7, 1, 9, 0),
                tzid: "America/New_York".to_string(),
            })
            .unwrap();
        assert_eq!(zoned.utc, Utc.with_ymd_and_hms(2025, 7, 1, 13, 0, 0).unwrap());
        assert_eq!(zoned.zone, chrono_tz::America::New_York);

        let unknown = strategy
            .normalize_to_utc(&FeedTime::DateTimeZoned {
                datetime: naive(2025, 7, 1, 9, 0),
                tzid: "Custom/Nowhere".to_string(),
            })
            .unwrap();
        assert_eq!(unknown.utc, Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_utc_and_dates_are_source_independent() {
        let instant = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        for source in [ical(), google()] {
            let strategy = source.time_normalization(chrono_tz::Asia::Tokyo);
            assert_eq!(
                strategy.normalize_to_utc(&FeedTime::DateTimeUtc(instant)).unwrap().utc,
                instant
            );
            let day = strategy
                .normalize_to_utc(&FeedTime::Date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()))
                .unwrap();
            assert_eq!(day.utc, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        }
    }

    #[test]
    fn test_dst_gap_is_unresolvable() {
        let strategy = TimeNormalization::HomeZone(chrono_tz::Europe::Stockholm);
        assert!(
            strategy
                .normalize_to_utc(&FeedTime::DateTimeFloating(naive(2025, 3, 30, 2, 30)))
                .is_none()
        );
    }
}
