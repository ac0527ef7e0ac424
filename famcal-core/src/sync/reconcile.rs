//! Month bucket reconciliation.
//!
//! Merges the occurrences a feed reports for one month with what is already
//! stored for that month. The feed decides when and what an occurrence is;
//! it never decides what a user attached to it. App-owned fields follow an
//! occurrence from its old full ID to its new one when only its time moved.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{StoredEvent, base_id_of};
use crate::sync::normalize::NormalizedEvent;

/// Counters for one or more reconciled buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    /// New occurrences with no stored counterpart
    pub created: usize,
    /// Occurrences whose full ID changed because their start time moved
    pub updated_identity: usize,
    /// Matched occurrences that carried activities forward
    pub preserved_activities: usize,
    /// Feed-sourced records dropped because the feed no longer reports them
    pub deleted: usize,
}

impl AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated_identity += other.updated_identity;
        self.preserved_activities += other.preserved_activities;
        self.deleted += other.deleted;
    }
}

/// Outcome of reconciling one month bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthReconciliation {
    /// Complete replacement contents for the bucket
    pub events: BTreeMap<String, StoredEvent>,
    pub stats: ReconcileStats,
}

impl MonthReconciliation {
    /// Whether writing `events` would change what is stored.
    pub fn changed_from(&self, existing: &BTreeMap<String, StoredEvent>) -> bool {
        self.events != *existing
    }
}

/// Reconcile a month's incoming feed occurrences against its stored events.
///
/// Matching happens in two passes. An incoming occurrence first claims a
/// stored record with the same full ID. Occurrences left over then claim
/// unclaimed stored records with the same base ID, earliest with earliest, so
/// a series whose every occurrence shifted by an hour keeps each occurrence's
/// attachments on the right instance.
///
/// Stored records that are not claimed survive unless they are feed-sourced
/// and their base ID is absent from `incoming`.
pub fn reconcile_month(
    existing: &BTreeMap<String, StoredEvent>,
    incoming: Vec<NormalizedEvent>,
) -> MonthReconciliation {
    let mut stats = ReconcileStats::default();

    // Stored full IDs per base ID, oldest start first
    let mut by_base: HashMap<&str, Vec<&str>> = HashMap::new();
    for full_id in existing.keys() {
        by_base.entry(base_id_of(full_id)).or_default().push(full_id);
    }
    for ids in by_base.values_mut() {
        ids.sort_by_key(|id| (existing[*id].start_time, *id));
    }

    let present: HashSet<String> = incoming.iter().map(|e| e.base_id.clone()).collect();

    // Exact full-ID matches
    let mut claimed: HashSet<String> = HashSet::new();
    let mut matches: Vec<Option<String>> = incoming
        .iter()
        .map(|new| {
            existing.contains_key(&new.full_id).then(|| {
                claimed.insert(new.full_id.clone());
                new.full_id.clone()
            })
        })
        .collect();

    // Same base ID, different start time
    let mut unmatched: Vec<usize> = (0..incoming.len()).filter(|i| matches[*i].is_none()).collect();
    unmatched.sort_by_key(|i| incoming[*i].event.start_time);

    // Stored IDs handed over to an occurrence with a new full ID
    let mut replaced: HashSet<String> = HashSet::new();
    for i in unmatched {
        let new = &incoming[i];
        let Some(candidates) = by_base.get(new.base_id.as_str()) else {
            continue;
        };
        if let Some(old_id) = candidates.iter().find(|id| !claimed.contains(**id)) {
            claimed.insert(old_id.to_string());
            replaced.insert(old_id.to_string());
            matches[i] = Some(old_id.to_string());
        }
    }

    let mut events = BTreeMap::new();
    for (new, matched) in incoming.into_iter().zip(matches) {
        let mut merged = new.event;

        match matched.as_deref().and_then(|id| existing.get_key_value(id)) {
            Some((old_id, prior)) => {
                merged.carry_app_fields_from(prior);
                if !prior.activities.is_empty() {
                    stats.preserved_activities += 1;
                }
                if *old_id != new.full_id {
                    stats.updated_identity += 1;
                    debug!(old = %old_id, new = %new.full_id, "Occurrence moved");
                }
            }
            None => stats.created += 1,
        }

        events.insert(new.full_id, merged);
    }

    for (full_id, stored) in existing {
        if events.contains_key(full_id) || replaced.contains(full_id) {
            continue;
        }
        if stored.is_feed_sourced() && !present.contains(base_id_of(full_id)) {
            stats.deleted += 1;
            debug!(%full_id, "Dropping event no longer in feed");
            continue;
        }
        events.insert(full_id.clone(), stored.clone());
    }

    MonthReconciliation { events, stats }
}
