//! Storage port.
//!
//! The sync engine and the manual write paths only ever talk to storage
//! through [`Store`]. A calendar's month buckets and its status record change
//! together in one [`WriteBatch`], so readers never observe buckets from one
//! sync next to the status of another.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::AdminMessage;
use crate::calendar::{AggregateCounters, Calendar, SyncStatus};
use crate::error::CoreResult;
use crate::month::{MonthBucket, MonthKey};

/// New values for a calendar's sync status fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SyncStatus,
    pub at: DateTime<Utc>,
    pub error: Option<String>,
    /// `None` keeps the counters of the last successful sync
    pub counters: Option<AggregateCounters>,
}

impl StatusUpdate {
    pub fn success(at: DateTime<Utc>, counters: AggregateCounters) -> Self {
        StatusUpdate {
            status: SyncStatus::Success,
            at,
            error: None,
            counters: Some(counters),
        }
    }

    pub fn failure(at: DateTime<Utc>, error: impl Into<String>) -> Self {
        StatusUpdate {
            status: SyncStatus::Error,
            at,
            error: Some(error.into()),
            counters: None,
        }
    }

    pub fn apply_to(&self, calendar: &mut Calendar) {
        calendar.sync_status = self.status;
        calendar.last_synced_at = Some(self.at);
        calendar.last_error = self.error.clone();
        if let Some(counters) = &self.counters {
            calendar.counters = counters.clone();
        }
    }
}

/// Everything one calendar write changes, committed all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub calendar_id: String,
    /// Full replacements; an event missing from a bucket is deleted
    pub buckets: Vec<MonthBucket>,
    pub status: Option<StatusUpdate>,
}

impl WriteBatch {
    pub fn new(calendar_id: &str) -> Self {
        WriteBatch {
            calendar_id: calendar_id.to_string(),
            buckets: Vec::new(),
            status: None,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn list_calendars(&self) -> CoreResult<Vec<Calendar>>;

    async fn get_calendar(&self, id: &str) -> CoreResult<Option<Calendar>>;

    /// Create or overwrite a calendar record. Buckets are untouched.
    async fn put_calendar(&self, calendar: &Calendar) -> CoreResult<()>;

    async fn load_month(&self, calendar_id: &str, month: MonthKey) -> CoreResult<Option<MonthBucket>>;

    /// Every stored bucket of a calendar, oldest month first
    async fn load_months(&self, calendar_id: &str) -> CoreResult<Vec<MonthBucket>>;

    /// Apply a batch atomically. Fails with `CalendarNotFound` when the
    /// calendar record does not exist.
    async fn commit(&self, batch: WriteBatch) -> CoreResult<()>;

    async fn append_admin_message(&self, message: &AdminMessage) -> CoreResult<()>;

    /// Stored admin messages, oldest first
    async fn admin_messages(&self) -> CoreResult<Vec<AdminMessage>>;
}
