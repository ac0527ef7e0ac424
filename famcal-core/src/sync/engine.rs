//! Sync orchestration.
//!
//! One calendar sync walks `Started → Fetching → Parsing → Expanding →
//! Reconciling → Writing` and ends in `Succeeded` or `FailedPerCalendar`.
//! Whatever happens, the calendar's status record reflects the outcome.
//! Batches run calendars one after another and never let one calendar's
//! failure stop the next. Failures of the run itself end in
//! `CriticalFailure` and a critical admin alert.
//!
//! Two syncs of the same calendar must not overlap: each reads a month,
//! reconciles it and writes it back, with no locking in between. Callers
//! that can trigger syncs concurrently need their own per-calendar lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::alert::{AdminAlerts, CalendarFailure};
use crate::calendar::AggregateCounters;
use crate::error::{CoreError, CoreResult};
use crate::feed::{FeedFetcher, parse_feed};
use crate::store::Store;
use crate::sync::bucket::bucket_by_month;
use crate::sync::normalize::normalize_feed;
use crate::sync::protocol::{
    BatchSyncRequest, BatchSyncResponse, CalendarSyncOutcome, SyncRequest, SyncResponse, SyncTarget,
};
use crate::sync::reconcile::reconcile_month;
use crate::sync::window::{DEFAULT_MONTHS_BACK, DEFAULT_MONTHS_FORWARD, SyncWindow};
use crate::sync::writer::{PendingWrite, failure_batch};

const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(9 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Started,
    Fetching,
    Parsing,
    Expanding,
    Reconciling,
    Writing,
    Succeeded,
    FailedPerCalendar,
    CriticalFailure,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::Started => "starting",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Parsing => "parsing",
            SyncPhase::Expanding => "expanding",
            SyncPhase::Reconciling => "reconciling",
            SyncPhase::Writing => "writing",
            SyncPhase::Succeeded => "succeeded",
            SyncPhase::FailedPerCalendar => "failed",
            SyncPhase::CriticalFailure => "critical failure",
        };
        write!(f, "{}", s)
    }
}

/// A calendar sync that stopped, and where.
#[derive(Debug, Error)]
#[error("{phase}: {error}")]
pub struct SyncFailure {
    pub phase: SyncPhase,
    #[source]
    pub error: CoreError,
}

impl SyncFailure {
    fn at(phase: SyncPhase) -> impl FnOnce(CoreError) -> SyncFailure {
        move |error| SyncFailure { phase, error }
    }
}

/// Knobs resolved once at startup.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Zone that floating feed times are read in
    pub home_tz: Tz,
    pub months_back: u32,
    pub months_forward: u32,
    /// Upper bound for one invocation: a single sync, a batch or a scheduled run
    pub invocation_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            home_tz: Tz::UTC,
            months_back: DEFAULT_MONTHS_BACK,
            months_forward: DEFAULT_MONTHS_FORWARD,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }
}

pub struct SyncEngine {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn FeedFetcher>,
    alerts: AdminAlerts,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn FeedFetcher>,
        alerts: AdminAlerts,
        settings: SyncSettings,
    ) -> Self {
        SyncEngine {
            store,
            fetcher,
            alerts,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Sync one calendar. Failures come back as `success: false`.
    pub async fn sync_calendar(&self, request: SyncRequest) -> SyncResponse {
        self.sync_calendar_at(request, Utc::now()).await
    }

    /// [`Self::sync_calendar`] with the window anchored at `now`.
    pub async fn sync_calendar_at(&self, request: SyncRequest, now: DateTime<Utc>) -> SyncResponse {
        let limit = self.settings.invocation_timeout;
        self.sync_calendar_within(request, now, Some(limit)).await
    }

    async fn sync_calendar_within(
        &self,
        request: SyncRequest,
        now: DateTime<Utc>,
        limit: Option<Duration>,
    ) -> SyncResponse {
        let window = SyncWindow::around(
            now,
            request.months_back.unwrap_or(self.settings.months_back),
            request.months_forward.unwrap_or(self.settings.months_forward),
        );
        let calendar_id = request.calendar_id.as_str();

        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, self.run_calendar(&request, &window, now))
                .await
                .unwrap_or_else(|_| {
                    Err(SyncFailure {
                        phase: SyncPhase::FailedPerCalendar,
                        error: CoreError::Timeout(limit.as_secs()),
                    })
                }),
            None => self.run_calendar(&request, &window, now).await,
        };

        match outcome {
            Ok(counters) => {
                trace_phase(calendar_id, SyncPhase::Succeeded);
                info!(
                    calendar_id,
                    events = counters.event_count,
                    months = counters.months_covered,
                    created = counters.created,
                    moved = counters.updated_identity,
                    preserved = counters.preserved_activities,
                    deleted = counters.deleted,
                    "Calendar synced"
                );
                SyncResponse {
                    success: true,
                    message: None,
                    event_count: counters.event_count,
                    months_covered: counters.months_covered,
                    created_count: counters.created,
                    preserved_activities_count: counters.preserved_activities,
                    deleted_events_count: counters.deleted,
                    updated_event_ids_count: counters.updated_identity,
                }
            }
            Err(failure) => {
                trace_phase(calendar_id, SyncPhase::FailedPerCalendar);
                error!(calendar_id, phase = %failure.phase, "Calendar sync failed: {}", failure.error);

                let message = failure.to_string();
                if !matches!(failure.error, CoreError::CalendarNotFound(_)) {
                    let batch = failure_batch(calendar_id, &message, now);
                    if let Err(e) = self.store.commit(batch).await {
                        warn!(calendar_id, "Could not record sync failure: {}", e);
                    }
                }
                SyncResponse::failed(message)
            }
        }
    }

    async fn run_calendar(
        &self,
        request: &SyncRequest,
        window: &SyncWindow,
        now: DateTime<Utc>,
    ) -> Result<AggregateCounters, SyncFailure> {
        let calendar_id = request.calendar_id.as_str();
        trace_phase(calendar_id, SyncPhase::Started);

        let calendar = self
            .store
            .get_calendar(calendar_id)
            .await
            .map_err(SyncFailure::at(SyncPhase::Started))?
            .ok_or_else(|| SyncFailure {
                phase: SyncPhase::Started,
                error: CoreError::CalendarNotFound(calendar_id.to_string()),
            })?;

        let source = request.source.as_ref().unwrap_or(&calendar.source);
        if !source.is_sync_eligible() {
            return Err(SyncFailure {
                phase: SyncPhase::Started,
                error: CoreError::NotSyncable(calendar_id.to_string()),
            });
        }

        trace_phase(calendar_id, SyncPhase::Fetching);
        debug!(calendar_id, source = source.kind(), "Fetching feed");
        let body = self
            .fetcher
            .fetch(source)
            .await
            .map_err(SyncFailure::at(SyncPhase::Fetching))?;

        trace_phase(calendar_id, SyncPhase::Parsing);
        let raw = parse_feed(&body).map_err(SyncFailure::at(SyncPhase::Parsing))?;

        trace_phase(calendar_id, SyncPhase::Expanding);
        let normalization = source.time_normalization(self.settings.home_tz);
        let mut by_month = bucket_by_month(normalize_feed(&raw, normalization, window));

        trace_phase(calendar_id, SyncPhase::Reconciling);
        let mut pending = PendingWrite::new(calendar_id);
        let no_events = BTreeMap::new();
        for month in window.months() {
            let existing = self
                .store
                .load_month(calendar_id, *month)
                .await
                .map_err(SyncFailure::at(SyncPhase::Reconciling))?;
            let incoming = by_month.remove(month).unwrap_or_default();
            let feed_events = incoming.len();

            let stored = existing.as_ref().map(|b| &b.events).unwrap_or(&no_events);
            let reconciliation = reconcile_month(stored, incoming);
            pending.stage_month(*month, existing.as_ref(), feed_events, reconciliation, now);
        }
        if !by_month.is_empty() {
            debug!(calendar_id, months = by_month.len(), "Ignoring occurrences outside the window");
        }

        trace_phase(calendar_id, SyncPhase::Writing);
        let counters = pending.counters();
        self.store
            .commit(pending.finish(now))
            .await
            .map_err(SyncFailure::at(SyncPhase::Writing))?;

        Ok(counters)
    }

    /// Sync several calendars in order. Any failures are summarized in one admin alert.
    pub async fn sync_batch(&self, request: BatchSyncRequest) -> BatchSyncResponse {
        self.sync_batch_at(request, Utc::now()).await
    }

    /// [`Self::sync_batch`] with windows anchored at `now`. Calendars still
    /// waiting when the invocation timeout runs out fail with a timeout.
    pub async fn sync_batch_at(&self, request: BatchSyncRequest, now: DateTime<Utc>) -> BatchSyncResponse {
        let deadline = Instant::now() + self.settings.invocation_timeout;
        self.run_batch(request, now, Some(deadline)).await
    }

    async fn run_batch(
        &self,
        request: BatchSyncRequest,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> BatchSyncResponse {
        let mut results = Vec::with_capacity(request.calendars.len());
        let mut failures = Vec::new();

        for SyncTarget {
            calendar_id,
            source,
        } in request.calendars
        {
            let single = SyncRequest {
                calendar_id: calendar_id.clone(),
                source,
                months_back: request.months_back,
                months_forward: request.months_forward,
            };
            let limit = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let response = self.sync_calendar_within(single, now, limit).await;

            if !response.success {
                failures.push(CalendarFailure {
                    calendar_id: calendar_id.clone(),
                    message: response.message.clone().unwrap_or_default(),
                });
            }
            results.push(CalendarSyncOutcome {
                calendar_id,
                response,
            });
        }

        self.alerts.calendar_failures(&failures).await;

        let response = BatchSyncResponse::from(results);
        info!(
            total = response.total_count,
            succeeded = response.success_count,
            failed = response.error_count,
            "Batch sync finished"
        );
        response
    }

    /// Sync every sync-eligible calendar with the default window.
    ///
    /// Errors only when the run as a whole failed (calendars could not be
    /// listed, or the invocation timed out); a critical alert has then
    /// already been raised.
    pub async fn run_scheduled(&self) -> CoreResult<BatchSyncResponse> {
        let limit = self.settings.invocation_timeout;

        let result = match tokio::time::timeout(limit, self.scheduled_batch()).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(limit.as_secs())),
        };

        if let Err(e) = &result {
            error!(phase = %SyncPhase::CriticalFailure, "Scheduled sync aborted: {}", e);
            self.alerts.critical(e).await;
        }
        result
    }

    async fn scheduled_batch(&self) -> CoreResult<BatchSyncResponse> {
        let calendars = self.store.list_calendars().await?;
        let targets: Vec<SyncTarget> = calendars
            .into_iter()
            .filter(|c| c.source.is_sync_eligible())
            .map(|c| SyncTarget {
                calendar_id: c.id,
                source: None,
            })
            .collect();

        info!(calendars = targets.len(), "Starting scheduled sync");

        let request = BatchSyncRequest {
            calendars: targets,
            months_back: None,
            months_forward: None,
        };
        // The caller's timeout bounds the whole run
        Ok(self.run_batch(request, Utc::now(), None).await)
    }
}

fn trace_phase(calendar_id: &str, phase: SyncPhase) {
    debug!(calendar_id, %phase, "Sync phase");
}
