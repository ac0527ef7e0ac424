use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// A date or date-time exactly as the feed wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedTime {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// `...Z` suffixed instant
    DateTimeUtc(DateTime<Utc>),
    /// Wall-clock time with no zone information
    DateTimeFloating(NaiveDateTime),
    /// Wall-clock time with a `TZID` parameter
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl fmt::Display for FeedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedTime::Date(d) => write!(f, "{}", d),
            FeedTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            FeedTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            FeedTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%dT%H:%M:%S"), tzid)
            }
        }
    }
}

/// One VEVENT from a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: FeedTime,
    pub end: Option<FeedTime>,
    /// `DURATION`, used when there is no `DTEND`
    pub duration: Option<Duration>,
    /// RRULE value without the `RRULE:` prefix
    pub rrule: Option<String>,
    pub exdates: Vec<FeedTime>,
    /// Set on instances that override one occurrence of a series
    pub recurrence_id: Option<FeedTime>,
    pub cancelled: bool,
}

impl RawEvent {
    pub fn date_only(&self) -> bool {
        matches!(self.start, FeedTime::Date(_))
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some()
    }

    /// Short label for log lines
    pub fn label(&self) -> &str {
        self.uid.as_deref().unwrap_or(&self.summary)
    }
}
