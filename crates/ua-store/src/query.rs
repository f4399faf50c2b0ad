//! Read-only analytics queries for dashboard consumers.
//!
//! Everything here is derived from merged log reads; nothing is cached
//! beyond a single call.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike};
use serde::Serialize;

use ua_core::{AttributionRecord, ProjectKey, TokenUsage};

use crate::repo::{AttributionRepository, EventRepository};
use crate::{LogStore, StoreError};

/// Cost and event count for one project over a queried range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTotals {
    pub project_key: ProjectKey,
    pub total_cents: i64,
    pub event_count: u64,
}

/// Per-model usage for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelBreakdown {
    pub model: String,
    pub event_count: u64,
    pub tokens: TokenUsage,
    pub total_cents: i64,
}

/// Rollup of events no project owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnattributedSummary {
    pub event_count: u64,
    pub total_cents: i64,
}

/// Total cost per project over `[start, end)`, most expensive first.
///
/// Events without a current attribution count under the `unattributed`
/// sentinel.
pub fn totals_by_project(
    store: &LogStore,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<ProjectTotals>, StoreError> {
    let events = EventRepository::new(store).list_in_range(start_ms, end_ms)?;
    let attributions = AttributionRepository::new(store).current_map()?;

    let mut totals: BTreeMap<ProjectKey, ProjectTotals> = BTreeMap::new();
    for event in events {
        let key = attributions
            .get(&event.event_id)
            .map_or_else(ProjectKey::unattributed, |a| a.project_key.clone());

        let entry = totals.entry(key.clone()).or_insert_with(|| ProjectTotals {
            project_key: key,
            total_cents: 0,
            event_count: 0,
        });
        entry.total_cents += event.cost_cents;
        entry.event_count += 1;
    }

    let mut totals: Vec<ProjectTotals> = totals.into_values().collect();
    totals.sort_by(|a, b| {
        b.total_cents
            .cmp(&a.total_cents)
            .then_with(|| a.project_key.cmp(&b.project_key))
    });
    Ok(totals)
}

/// Per-model usage for one project over `[start, end)`, most expensive
/// model first.
pub fn project_breakdown(
    store: &LogStore,
    project_key: &ProjectKey,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<ModelBreakdown>, StoreError> {
    let events = EventRepository::new(store).list_in_range(start_ms, end_ms)?;
    let attributions = AttributionRepository::new(store).current_map()?;

    let mut by_model: BTreeMap<String, ModelBreakdown> = BTreeMap::new();
    for event in events {
        let owner = attributions.get(&event.event_id);
        if owner.is_none_or(|a| a.project_key != *project_key) {
            continue;
        }

        let entry = by_model
            .entry(event.model.clone())
            .or_insert_with(|| ModelBreakdown {
                model: event.model.clone(),
                event_count: 0,
                tokens: TokenUsage::default(),
                total_cents: 0,
            });
        entry.event_count += 1;
        entry.total_cents += event.cost_cents;
        entry.tokens.input_tokens += event.tokens.input_tokens;
        entry.tokens.output_tokens += event.tokens.output_tokens;
        entry.tokens.cache_read_tokens += event.tokens.cache_read_tokens;
        entry.tokens.cache_creation_tokens += event.tokens.cache_creation_tokens;
    }

    let mut breakdown: Vec<ModelBreakdown> = by_model.into_values().collect();
    breakdown.sort_by(|a, b| {
        b.total_cents
            .cmp(&a.total_cents)
            .then_with(|| a.model.cmp(&b.model))
    });
    Ok(breakdown)
}

/// Cost in cents per UTC hour of day over `[start, end)`.
pub fn hourly_heatmap(
    store: &LogStore,
    start_ms: i64,
    end_ms: i64,
) -> Result<[i64; 24], StoreError> {
    let events = EventRepository::new(store).list_in_range(start_ms, end_ms)?;

    let mut hours = [0i64; 24];
    for event in events {
        if let Some(dt) = DateTime::from_timestamp_millis(event.timestamp_ms) {
            hours[dt.hour() as usize] += event.cost_cents;
        }
    }
    Ok(hours)
}

/// Rollup of events whose current attribution is the unattributed
/// sentinel (or missing) over `[start, end)`.
pub fn unattributed_summary(
    store: &LogStore,
    start_ms: i64,
    end_ms: i64,
) -> Result<UnattributedSummary, StoreError> {
    let events = EventRepository::new(store).list_in_range(start_ms, end_ms)?;
    let attributions = AttributionRepository::new(store).current_map()?;

    let mut summary = UnattributedSummary::default();
    for event in events {
        let unowned = attributions
            .get(&event.event_id)
            .is_none_or(|a| a.project_key.is_unattributed());
        if unowned {
            summary.event_count += 1;
            summary.total_cents += event.cost_cents;
        }
    }
    Ok(summary)
}

/// Low-confidence attributions that did land on a project, over
/// `[start, end)` — the "needs review" set, ordered by time.
pub fn conflict_summary(
    store: &LogStore,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<AttributionRecord>, StoreError> {
    let attributions = AttributionRepository::new(store).current_map()?;

    let mut conflicts: Vec<AttributionRecord> = attributions
        .into_values()
        .filter(|a| {
            a.timestamp_ms >= start_ms
                && a.timestamp_ms < end_ms
                && !a.project_key.is_unattributed()
                && a.needs_review()
        })
        .collect();
    conflicts.sort_by(|a, b| (a.timestamp_ms, &a.event_id).cmp(&(b.timestamp_ms, &b.event_id)));
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ua_core::{EventId, InstanceId, ProjectSession, SessionId, UsageEvent, attribute};

    use crate::repo::{AttributionRepository, EventRepository};

    fn store() -> (tempfile::TempDir, LogStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = LogStore::open(temp.path().join("data")).unwrap();
        (temp, store)
    }

    fn event(id: &str, ts: i64, model: &str, cost: i64) -> UsageEvent {
        UsageEvent {
            event_id: EventId::new(id).unwrap(),
            timestamp_ms: ts,
            model: model.to_string(),
            tokens: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
            },
            cost_cents: cost,
            source: "api".to_string(),
        }
    }

    fn session(id: &str, key: &str, focused: bool) -> ProjectSession {
        ProjectSession {
            id: SessionId::new(id).unwrap(),
            project_key: ProjectKey::new(key).unwrap(),
            start_ms: 0,
            end_ms: None,
            focused,
            idle: false,
            instance_id: InstanceId::new(format!("i-{id}")).unwrap(),
        }
    }

    /// Seeds two attributed events on p1, one on p2, one unattributed.
    fn seed(store: &LogStore) {
        let events = EventRepository::new(store);
        let attributions = AttributionRepository::new(store);

        let fixtures = [
            event("e1", 1_000, "claude-sonnet-4", 5),
            event("e2", 2_000, "claude-opus-4", 20),
            event("e3", 3_000, "claude-sonnet-4", 7),
            event("e4", 4_000, "claude-sonnet-4", 3),
        ];
        events.insert_new(&fixtures).unwrap();

        let p1 = [session("s1", "p1", true)];
        let p2 = [session("s2", "p2", true)];
        attributions.upsert(&attribute(&fixtures[0], &p1)).unwrap();
        attributions.upsert(&attribute(&fixtures[1], &p1)).unwrap();
        attributions.upsert(&attribute(&fixtures[2], &p2)).unwrap();
        attributions.upsert(&attribute(&fixtures[3], &[])).unwrap();
    }

    #[test]
    fn totals_rank_projects_by_cost() {
        let (_temp, store) = store();
        seed(&store);

        let totals = totals_by_project(&store, 0, 10_000).unwrap();
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].project_key.as_str(), "p1");
        assert_eq!(totals[0].total_cents, 25);
        assert_eq!(totals[0].event_count, 2);
        assert_eq!(totals[1].project_key.as_str(), "p2");
        assert_eq!(totals[2].project_key.as_str(), "unattributed");
        assert_eq!(totals[2].total_cents, 3);
    }

    #[test]
    fn totals_respect_time_range() {
        let (_temp, store) = store();
        seed(&store);

        let totals = totals_by_project(&store, 0, 2_000).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_cents, 5);
    }

    #[test]
    fn breakdown_groups_by_model() {
        let (_temp, store) = store();
        seed(&store);

        let key = ProjectKey::new("p1").unwrap();
        let breakdown = project_breakdown(&store, &key, 0, 10_000).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].model, "claude-opus-4");
        assert_eq!(breakdown[0].total_cents, 20);
        assert_eq!(breakdown[1].model, "claude-sonnet-4");
        assert_eq!(breakdown[1].tokens.input_tokens, 100);
    }

    #[test]
    fn heatmap_buckets_by_utc_hour() {
        let (_temp, store) = store();
        let events = EventRepository::new(&store);
        // 1970-01-01 00:00 and 01:00 UTC.
        events
            .insert_new(&[event("e1", 1_000, "m", 5), event("e2", 3_600_000, "m", 7)])
            .unwrap();

        let hours = hourly_heatmap(&store, 0, i64::MAX).unwrap();
        assert_eq!(hours[0], 5);
        assert_eq!(hours[1], 7);
        assert_eq!(hours[2..].iter().sum::<i64>(), 0);
    }

    #[test]
    fn unattributed_summary_counts_sentinel_and_missing() {
        let (_temp, store) = store();
        seed(&store);
        // e5 has no attribution record at all.
        EventRepository::new(&store)
            .insert_new(&[event("e5", 5_000, "m", 2)])
            .unwrap();

        let summary = unattributed_summary(&store, 0, 10_000).unwrap();
        assert_eq!(summary.event_count, 2);
        assert_eq!(summary.total_cents, 5);
    }

    #[test]
    fn conflict_summary_excludes_unattributed() {
        let (_temp, store) = store();
        let events = EventRepository::new(&store);
        let attributions = AttributionRepository::new(&store);

        let conflicted = event("e1", 1_000, "m", 5);
        let clean = event("e2", 2_000, "m", 5);
        let orphan = event("e3", 3_000, "m", 5);
        events
            .insert_new(&[conflicted.clone(), clean.clone(), orphan.clone()])
            .unwrap();

        let both = [session("s1", "p1", true), session("s2", "p2", true)];
        attributions.upsert(&attribute(&conflicted, &both)).unwrap();
        attributions
            .upsert(&attribute(&clean, &both[..1]))
            .unwrap();
        attributions.upsert(&attribute(&orphan, &[])).unwrap();

        let conflicts = conflict_summary(&store, 0, 10_000).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].event_id.as_str(), "e1");
        assert_eq!(conflicts[0].conflicts.len(), 2);
    }
}
