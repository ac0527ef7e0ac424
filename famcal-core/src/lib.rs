//! Core of famcal: calendar feed sync and reconciliation.
//!
//! Feeds are fetched, parsed, expanded into concrete occurrences and merged
//! into month buckets without losing anything people attached to events:
//! - `feed` fetches and parses iCalendar feeds
//! - `sync` turns feed events into reconciled month buckets and drives runs
//! - `store` is the storage port with in-memory and on-disk adapters
//! - `manual` writes events that did not come from a feed

pub mod alert;
pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod feed;
pub mod manual;
pub mod month;
pub mod schedule;
pub mod store;
pub mod sync;

pub use calendar::{Calendar, CalendarSource, SyncStatus};
pub use error::{CoreError, CoreResult};
pub use event::{Activity, EventOrigin, ReminderConfig, StoredEvent};
pub use month::{MonthBucket, MonthKey};
