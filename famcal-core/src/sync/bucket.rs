//! Grouping of normalized events by UTC month.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::month::MonthKey;
use crate::sync::normalize::NormalizedEvent;

/// Group events by the month of their UTC start, keeping feed order within
/// each month. A repeated full ID keeps its first occurrence.
pub fn bucket_by_month(events: Vec<NormalizedEvent>) -> BTreeMap<MonthKey, Vec<NormalizedEvent>> {
    let mut buckets: BTreeMap<MonthKey, Vec<NormalizedEvent>> = BTreeMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for event in events {
        if !seen.insert(event.full_id.clone()) {
            warn!(full_id = %event.full_id, "Feed reports the same occurrence twice; keeping the first");
            continue;
        }
        buckets.entry(event.month).or_default().push(event);
    }

    buckets
}
