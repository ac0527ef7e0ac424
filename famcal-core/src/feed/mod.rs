//! Calendar feed retrieval and parsing.
//!
//! Feeds are fetched as raw iCalendar text and parsed into `RawEvent`s, the
//! untouched view of each VEVENT before any timezone or identity handling.

mod fetch;
mod parse;
mod raw;

pub use fetch::{FeedFetcher, HttpFeedFetcher, StaticFeedFetcher, normalize_feed_url};
pub use parse::parse_feed;
pub use raw::{FeedTime, RawEvent};
