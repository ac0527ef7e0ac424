//! Calendar records and their feed sources.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const GOOGLE_PUBLIC_ICAL_BASE: &str = "https://calendar.google.com/calendar/ical";

/// Where a calendar's events come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalendarSource {
    /// A generic iCalendar subscription (`https://` or `webcal://`)
    Ical { url: String },
    /// A calendar provider's public export, addressed by the provider's calendar ID
    Google {
        #[serde(rename = "externalId")]
        external_id: String,
    },
    /// Events only ever created inside the app
    Local,
}

impl CalendarSource {
    pub fn kind(&self) -> &'static str {
        match self {
            CalendarSource::Ical { .. } => "ical",
            CalendarSource::Google { .. } => "google",
            CalendarSource::Local => "local",
        }
    }

    /// Whether the scheduled sync should pick this calendar up.
    pub fn is_sync_eligible(&self) -> bool {
        !matches!(self, CalendarSource::Local)
    }

    /// The feed URL as configured, before any scheme rewriting.
    pub fn feed_url(&self) -> Option<String> {
        match self {
            CalendarSource::Ical { url } => Some(url.clone()),
            CalendarSource::Google { external_id } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(external_id.as_bytes()).collect();
                Some(format!("{}/{}/public/basic.ics", GOOGLE_PUBLIC_ICAL_BASE, encoded))
            }
            CalendarSource::Local => None,
        }
    }
}

impl fmt::Display for CalendarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarSource::Ical { url } => write!(f, "ical:{}", url),
            CalendarSource::Google { external_id } => write!(f, "google:{}", external_id),
            CalendarSource::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Never,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Never => "never synced",
            SyncStatus::Success => "ok",
            SyncStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Totals from the most recent successful sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub event_count: usize,
    pub months_covered: usize,
    pub created: usize,
    pub updated_identity: usize,
    pub preserved_activities: usize,
    pub deleted: usize,
}

/// One calendar: its source, who follows it, and how its last sync went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub source: CalendarSource,
    #[serde(default)]
    pub subscribers: Vec<String>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub counters: AggregateCounters,
}

impl Calendar {
    pub fn new(id: &str, source: CalendarSource) -> Self {
        Calendar {
            id: id.to_string(),
            name: None,
            source,
            subscribers: Vec::new(),
            sync_status: SyncStatus::Never,
            last_synced_at: None,
            last_error: None,
            counters: AggregateCounters::default(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
