//! Derived per-project per-day cost rollup.
//!
//! The index is rebuilt deterministically from events joined against
//! their latest attribution; it is never independently mutated and is
//! safe to delete and regenerate.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use ua_core::types::UNATTRIBUTED_KEY;

use crate::log::write_atomic;
use crate::repo::{AttributionRepository, EventRepository};
use crate::{LogStore, StoreError};

/// File name of the derived index within the store directory.
pub const INDEX_FILE: &str = "index.cost_by_project_by_day.json";

const INDEX_VERSION: u32 = 1;

/// One day's rollup for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub total_cost: i64,
    pub event_count: u64,
    pub confidence_sum: f64,
}

/// The persisted index: `projectKey → day (YYYY-MM-DD) → bucket`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayIndex {
    pub version: u32,
    pub generated_at_ms: i64,
    pub by_project_by_day: BTreeMap<String, BTreeMap<String, DayBucket>>,
}

fn index_path(store: &LogStore) -> PathBuf {
    store.dir().join(INDEX_FILE)
}

/// Rebuilds the index from all events and their current attributions and
/// writes it atomically.
///
/// Events with no attribution record yet count under the `unattributed`
/// key with confidence 0.
pub fn rebuild_day_index(store: &LogStore, now_ms: i64) -> Result<DayIndex, StoreError> {
    let events = EventRepository::new(store).list()?;
    let attributions = AttributionRepository::new(store).current_map()?;

    let mut by_project_by_day: BTreeMap<String, BTreeMap<String, DayBucket>> = BTreeMap::new();
    for event in events {
        let Some(day) = day_key(event.timestamp_ms) else {
            tracing::trace!(event_id = %event.event_id, "skipping event with out-of-range timestamp");
            continue;
        };

        let attribution = attributions.get(&event.event_id);
        let project = attribution.map_or(UNATTRIBUTED_KEY, |a| a.project_key.as_str());
        let confidence = attribution.map_or(0.0, |a| f64::from(a.confidence.value()));

        let bucket = by_project_by_day
            .entry(project.to_string())
            .or_default()
            .entry(day)
            .or_default();
        bucket.total_cost += event.cost_cents;
        bucket.event_count += 1;
        bucket.confidence_sum += confidence;
    }

    let index = DayIndex {
        version: INDEX_VERSION,
        generated_at_ms: now_ms,
        by_project_by_day,
    };
    write_atomic(&index_path(store), serde_json::to_string(&index)?.as_bytes())?;
    Ok(index)
}

/// Loads the persisted index.
///
/// A missing or corrupt index simply means "rebuild": it is never fatal.
pub fn load_day_index(store: &LogStore) -> Result<Option<DayIndex>, StoreError> {
    let path = index_path(store);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str(&content) {
        Ok(index) => Ok(Some(index)),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "day index corrupt, ignoring");
            Ok(None)
        }
    }
}

/// UTC calendar day for a millisecond timestamp.
fn day_key(timestamp_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.format("%Y-%m-%d").to_string())
}
