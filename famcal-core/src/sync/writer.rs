//! Assembly of per-calendar write batches.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::calendar::AggregateCounters;
use crate::month::{MonthBucket, MonthKey};
use crate::store::{StatusUpdate, WriteBatch};
use crate::sync::reconcile::{MonthReconciliation, ReconcileStats};

/// Collects reconciled months for one calendar until the sync is ready to commit.
#[derive(Debug)]
pub struct PendingWrite {
    calendar_id: String,
    buckets: Vec<MonthBucket>,
    stats: ReconcileStats,
    event_count: usize,
    months_covered: usize,
}

impl PendingWrite {
    pub fn new(calendar_id: &str) -> Self {
        PendingWrite {
            calendar_id: calendar_id.to_string(),
            buckets: Vec::new(),
            stats: ReconcileStats::default(),
            event_count: 0,
            months_covered: 0,
        }
    }

    /// Queue the full replacement of one month.
    ///
    /// A month that was never stored and has nothing to hold is skipped, and so
    /// is a stored month whose contents would not change.
    pub fn stage_month(
        &mut self,
        month: MonthKey,
        existing: Option<&MonthBucket>,
        feed_events: usize,
        reconciliation: MonthReconciliation,
        now: DateTime<Utc>,
    ) {
        self.stats += reconciliation.stats;
        self.event_count += feed_events;

        match existing {
            None if reconciliation.events.is_empty() => return,
            Some(bucket) if !reconciliation.changed_from(&bucket.events) => {
                self.months_covered += 1;
                debug!(calendar_id = %self.calendar_id, %month, "Month unchanged");
                return;
            }
            _ => self.months_covered += 1,
        }

        debug!(
            calendar_id = %self.calendar_id,
            %month,
            events = reconciliation.events.len(),
            created = reconciliation.stats.created,
            moved = reconciliation.stats.updated_identity,
            deleted = reconciliation.stats.deleted,
            "Staged month"
        );

        self.buckets.push(MonthBucket {
            calendar_id: self.calendar_id.clone(),
            month,
            events: reconciliation.events,
            updated_at: now,
        });
    }

    pub fn counters(&self) -> AggregateCounters {
        AggregateCounters {
            event_count: self.event_count,
            months_covered: self.months_covered,
            created: self.stats.created,
            updated_identity: self.stats.updated_identity,
            preserved_activities: self.stats.preserved_activities,
            deleted: self.stats.deleted,
        }
    }

    /// Every staged bucket plus a success status, as one batch.
    pub fn finish(self, at: DateTime<Utc>) -> WriteBatch {
        let status = StatusUpdate::success(at, self.counters());
        WriteBatch {
            calendar_id: self.calendar_id,
            buckets: self.buckets,
            status: Some(status),
        }
    }
}

/// A status-only batch recording a failed sync.
pub fn failure_batch(calendar_id: &str, message: &str, at: DateTime<Utc>) -> WriteBatch {
    WriteBatch {
        calendar_id: calendar_id.to_string(),
        buckets: Vec::new(),
        status: Some(StatusUpdate::failure(at, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SyncStatus;
    use std::collections::BTreeMap;

    fn reconciliation(events: usize, created: usize) -> MonthReconciliation {
        let mut map = BTreeMap::new();
        for i in 0..events {
            let start = Utc::now();
            map.insert(
                format!("e{}-{}", i, i),
                crate::event::StoredEvent {
                    title: "x".into(),
                    description: None,
                    location: None,
                    start_time: start,
                    end_time: start,
                    is_all_day: false,
                    origin: crate::event::EventOrigin::Feed,
                    recurring_event_id: None,
                    activities: Vec::new(),
                    reminders: None,
                },
            );
        }
        MonthReconciliation {
            events: map,
            stats: ReconcileStats {
                created,
                ..Default::default()
            },
        }
    }

    fn stored(month: &str, reconciliation: &MonthReconciliation) -> MonthBucket {
        MonthBucket {
            calendar_id: "swim".into(),
            month: month.parse().unwrap(),
            events: reconciliation.events.clone(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_untouched_empty_months_are_not_written() {
        let now = Utc::now();
        let mut pending = PendingWrite::new("swim");
        pending.stage_month("2025-02".parse().unwrap(), None, 0, reconciliation(0, 0), now);
        pending.stage_month("2025-03".parse().unwrap(), None, 2, reconciliation(2, 2), now);
        // Emptied but previously stored: must be written to clear it
        let april = stored("2025-04", &reconciliation(1, 0));
        pending.stage_month("2025-04".parse().unwrap(), Some(&april), 0, reconciliation(0, 0), now);

        let batch = pending.finish(now);
        let months: Vec<String> = batch.buckets.iter().map(|b| b.month.to_string()).collect();
        assert_eq!(months, vec!["2025-03", "2025-04"]);

        let status = batch.status.unwrap();
        assert_eq!(status.status, SyncStatus::Success);
        let counters = status.counters.unwrap();
        assert_eq!(counters.event_count, 2);
        assert_eq!(counters.months_covered, 2);
        assert_eq!(counters.created, 2);
    }

    #[test]
    fn test_unchanged_months_are_covered_but_not_rewritten() {
        let now = Utc::now();
        let unchanged = reconciliation(3, 0);
        let march = stored("2025-03", &unchanged);

        let mut pending = PendingWrite::new("swim");
        pending.stage_month("2025-03".parse().unwrap(), Some(&march), 3, unchanged, now);

        let batch = pending.finish(now);
        assert!(batch.buckets.is_empty());
        let counters = batch.status.unwrap().counters.unwrap();
        assert_eq!(counters.months_covered, 1);
        assert_eq!(counters.event_count, 3);
    }

    #[test]
    fn test_failure_batch_is_status_only() {
        let batch = failure_batch("swim", "fetching: HTTP 404", Utc::now());
        assert!(batch.buckets.is_empty());
        let status = batch.status.unwrap();
        assert_eq!(status.status, SyncStatus::Error);
        assert!(status.counters.is_none());
    }
}
