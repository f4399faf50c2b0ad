//! Incremental sync of external usage events into the store.
//!
//! Drives one fetch window per call: cursor read, lookback-adjusted
//! start, retried fetch, idempotent event and attribution upserts, and
//! high-water-mark persistence. The cursor tracks *observed* event
//! timestamps, never wall-clock request boundaries, and never regresses.

use serde::Serialize;
use thiserror::Error;

use ua_core::attribute;
use ua_store::{
    AttributionRepository, CursorRepository, EventRepository, LogStore, SessionRepository,
    StoreError,
};

use crate::retry::{RetryConfig, fetch_with_retry};
use crate::source::{SourceError, UsageSource};

/// Default lookback window subtracted from the resume point, so events
/// the source finalizes slightly after their nominal timestamp are not
/// skipped forever.
pub const DEFAULT_LOOKBACK_MS: i64 = 5 * 60 * 1000;

/// Tunables for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub lookback_ms: i64,
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lookback_ms: DEFAULT_LOOKBACK_MS,
            retry: RetryConfig::default(),
        }
    }
}

/// Sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage failed; propagated untouched from the store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The source fetch failed after exhausting retries. The cursor keeps
    /// its high-water mark and records the error.
    #[error("fetch from {source} failed: {error}")]
    Fetch {
        source: String,
        #[source]
        error: SourceError,
    },
}

/// What one sync run did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub source: String,
    pub effective_start_ms: i64,
    pub end_ms: i64,
    /// Events returned by the source for the window.
    pub fetched: usize,
    /// Events newly appended (the rest were known IDs).
    pub inserted: usize,
    /// Attribution records written (unchanged decisions are skipped).
    pub attributed: usize,
    /// Maximum observed event timestamp, the next resume point.
    pub max_seen_ms: Option<i64>,
}

/// Where a sync actually starts: the later of the requested start and the
/// cursor's high-water mark, minus the lookback window, floored at zero.
#[must_use]
pub fn effective_start(requested_start_ms: i64, last_fetched_ms: Option<i64>, lookback_ms: i64) -> i64 {
    match last_fetched_ms {
        None => requested_start_ms,
        Some(mark) => (requested_start_ms.max(mark) - lookback_ms).max(0),
    }
}

/// Pulls events for `[start, end]` from one source and merges them.
///
/// Idempotent end to end: re-syncing an overlapping window re-ingests
/// nothing (events are keyed by ID) and rewrites no attribution whose
/// decision is unchanged. Storage failures propagate untouched; fetch
/// failures are recorded on the cursor, then propagated.
pub async fn sync_source<S: UsageSource>(
    store: &LogStore,
    source: &S,
    start_ms: i64,
    end_ms: i64,
    now_ms: i64,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let cursors = CursorRepository::new(store);
    let source_id = source.source_id();

    let cursor = cursors.get(source_id)?;
    let effective_start_ms = effective_start(
        start_ms,
        cursor.map(|c| c.last_fetched_ms),
        options.lookback_ms,
    );

    tracing::debug!(
        source = source_id,
        effective_start_ms,
        end_ms,
        "fetching usage events"
    );
    let fetched = match fetch_with_retry(source, effective_start_ms, end_ms, &options.retry).await {
        Ok(events) => events,
        Err(error) => {
            // The high-water mark must never regress or silently clear;
            // only the error string and sync time change.
            cursors.record_failure(source_id, &error.to_string(), now_ms)?;
            return Err(SyncError::Fetch {
                source: source_id.to_string(),
                error,
            });
        }
    };

    let events = EventRepository::new(store);
    let attributions = AttributionRepository::new(store);
    let sessions = SessionRepository::new(store).list()?;

    let inserted = events.insert_new(&fetched)?;
    let current = attributions.current_map()?;

    let mut attributed = 0;
    let mut max_seen_ms: Option<i64> = None;
    for event in &fetched {
        max_seen_ms = Some(max_seen_ms.map_or(event.timestamp_ms, |m| m.max(event.timestamp_ms)));

        let record = attribute(event, &sessions);
        if current.get(&event.event_id) != Some(&record) {
            attributions.upsert(&record)?;
            attributed += 1;
        }
    }

    cursors.record_success(source_id, max_seen_ms, now_ms)?;

    let report = SyncReport {
        source: source_id.to_string(),
        effective_start_ms,
        end_ms,
        fetched: fetched.len(),
        inserted,
        attributed,
        max_seen_ms,
    };
    tracing::info!(
        source = report.source,
        fetched = report.fetched,
        inserted = report.inserted,
        attributed = report.attributed,
        "sync complete"
    );
    Ok(report)
}
