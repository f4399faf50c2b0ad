//! Typed repositories over the log store.
//!
//! Every write is an appended upsert intent, never an in-place mutation.
//! The merge-to-latest resolution runs at read time; compaction applies
//! the same rule eagerly, so the canonical set is identical either way.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ua_core::{
    AttributionRecord, Budget, EventId, InstanceId, Project, ProjectKey, ProjectSession, SessionId,
    SessionPatch, UsageEvent,
};

use crate::log::now_epoch_ms;
use crate::{CompactOutcome, LogStore, StoreError, aggregate};

/// Entity kind names; each maps to `<kind>.log` / `<kind>.snapshot.json`.
pub mod kind {
    pub const PROJECTS: &str = "projects";
    pub const SESSIONS: &str = "sessions";
    pub const EVENTS: &str = "events";
    pub const ATTRIBUTIONS: &str = "attributions";
    pub const BUDGETS: &str = "budgets";
    pub const CURSORS: &str = "cursors";

    pub const ALL: &[&str] = &[PROJECTS, SESSIONS, EVENTS, ATTRIBUTIONS, BUDGETS, CURSORS];
}

/// Decodes raw records into a typed form, skipping anything malformed.
fn decode_records<T: DeserializeOwned>(kind: &str, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::trace!(kind, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn encode_records<T: Serialize>(records: impl IntoIterator<Item = T>) -> Vec<Value> {
    records
        .into_iter()
        .filter_map(|record| serde_json::to_value(record).ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Projects

/// Read/write façade for [`Project`] records.
pub struct ProjectRepository<'a> {
    store: &'a LogStore,
}

impl<'a> ProjectRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Appends an upsert intent for this project.
    pub fn upsert(&self, project: &Project) -> Result<(), StoreError> {
        self.store
            .append(kind::PROJECTS, &serde_json::to_value(project)?)
    }

    /// All known projects, latest record per key.
    pub fn list(&self) -> Result<Vec<Project>, StoreError> {
        let raw = self.store.read_all(kind::PROJECTS)?;
        Ok(fold_projects(decode_records(kind::PROJECTS, raw)))
    }

    pub fn get(&self, key: &ProjectKey) -> Result<Option<Project>, StoreError> {
        Ok(self.list()?.into_iter().find(|p| p.project_key == *key))
    }
}

/// Latest record per project key wins, by `last_active_at`; ties go to
/// the later append.
fn fold_projects(records: Vec<Project>) -> Vec<Project> {
    let mut latest: HashMap<ProjectKey, Project> = HashMap::new();
    for project in records {
        match latest.get(&project.project_key) {
            Some(existing) if existing.last_active_at > project.last_active_at => {}
            _ => {
                latest.insert(project.project_key.clone(), project);
            }
        }
    }
    let mut projects: Vec<Project> = latest.into_values().collect();
    projects.sort_by(|a, b| a.project_key.cmp(&b.project_key));
    projects
}

fn reduce_projects(values: Vec<Value>) -> Vec<Value> {
    encode_records(fold_projects(decode_records(kind::PROJECTS, values)))
}

// ---------------------------------------------------------------------------
// Sessions

/// An appended session intent: created once, then patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum SessionIntent {
    Create { session: ProjectSession },
    Update { id: SessionId, patch: SessionPatch },
}

/// Read/write façade for [`ProjectSession`] segments.
pub struct SessionRepository<'a> {
    store: &'a LogStore,
}

impl<'a> SessionRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Persists a newly opened session segment.
    pub fn create(&self, session: &ProjectSession) -> Result<(), StoreError> {
        let intent = SessionIntent::Create {
            session: session.clone(),
        };
        self.store
            .append(kind::SESSIONS, &serde_json::to_value(&intent)?)
    }

    /// Appends a partial update for an existing session.
    pub fn update(&self, id: &SessionId, patch: &SessionPatch) -> Result<(), StoreError> {
        let intent = SessionIntent::Update {
            id: id.clone(),
            patch: patch.clone(),
        };
        self.store
            .append(kind::SESSIONS, &serde_json::to_value(&intent)?)
    }

    /// Reconstructs every session by replaying `create` then folding
    /// patches in append order.
    pub fn list(&self) -> Result<Vec<ProjectSession>, StoreError> {
        let raw = self.store.read_all(kind::SESSIONS)?;
        Ok(fold_sessions(decode_records(kind::SESSIONS, raw)))
    }

    /// Sessions whose interval covers the given timestamp, in stable
    /// (creation) order.
    pub fn active_at(&self, timestamp_ms: i64) -> Result<Vec<ProjectSession>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.active_at(timestamp_ms))
            .collect())
    }

    /// The open session for an instance, if one exists.
    ///
    /// Storage is shared, so any reader may observe (and close) another
    /// process's stale session.
    pub fn open_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Option<ProjectSession>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|s| s.is_open() && s.instance_id == *instance_id))
    }
}

fn fold_sessions(intents: Vec<SessionIntent>) -> Vec<ProjectSession> {
    let mut sessions: Vec<ProjectSession> = Vec::new();
    let mut index: HashMap<SessionId, usize> = HashMap::new();

    for intent in intents {
        match intent {
            SessionIntent::Create { session } => {
                // A session is created once; replayed creates are ignored.
                if !index.contains_key(&session.id) {
                    index.insert(session.id.clone(), sessions.len());
                    sessions.push(session);
                }
            }
            SessionIntent::Update { id, patch } => {
                if let Some(&at) = index.get(&id) {
                    patch.apply(&mut sessions[at]);
                } else {
                    tracing::trace!(session_id = %id, "dropping patch for unknown session");
                }
            }
        }
    }
    sessions
}

fn reduce_sessions(values: Vec<Value>) -> Vec<Value> {
    let mut sessions = fold_sessions(decode_records(kind::SESSIONS, values));
    sessions.sort_by(|a, b| (a.start_ms, &a.id).cmp(&(b.start_ms, &b.id)));
    encode_records(
        sessions
            .into_iter()
            .map(|session| SessionIntent::Create { session }),
    )
}

// ---------------------------------------------------------------------------
// Events

/// Read/write façade for [`UsageEvent`] records.
pub struct EventRepository<'a> {
    store: &'a LogStore,
}

impl<'a> EventRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Inserts a batch of events, ignoring IDs already present.
    ///
    /// Returns how many were actually appended. Duplicate ingestion of
    /// the same `event_id` is a no-op, so re-syncing an overlapping
    /// window is safe.
    pub fn insert_new(&self, events: &[UsageEvent]) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut seen = self.ids()?;
        let mut inserted = 0;
        for event in events {
            if !seen.insert(event.event_id.clone()) {
                continue;
            }
            self.store
                .append(kind::EVENTS, &serde_json::to_value(event)?)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// IDs of every stored event.
    pub fn ids(&self) -> Result<HashSet<EventId>, StoreError> {
        Ok(self.list()?.into_iter().map(|e| e.event_id).collect())
    }

    /// All events, deduplicated by ID, ordered by timestamp then ID.
    pub fn list(&self) -> Result<Vec<UsageEvent>, StoreError> {
        let raw = self.store.read_all(kind::EVENTS)?;
        Ok(fold_events(decode_records(kind::EVENTS, raw)))
    }

    /// Events within `[start, end)`.
    pub fn list_in_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageEvent>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.timestamp_ms >= start_ms && e.timestamp_ms < end_ms)
            .collect())
    }
}

/// First record per event ID wins; later duplicates carry the same
/// content by the global-uniqueness invariant.
fn fold_events(records: Vec<UsageEvent>) -> Vec<UsageEvent> {
    let mut seen: HashSet<EventId> = HashSet::new();
    let mut events: Vec<UsageEvent> = records
        .into_iter()
        .filter(|event| seen.insert(event.event_id.clone()))
        .collect();
    events.sort_by(|a, b| (a.timestamp_ms, &a.event_id).cmp(&(b.timestamp_ms, &b.event_id)));
    events
}

fn reduce_events(values: Vec<Value>) -> Vec<Value> {
    encode_records(fold_events(decode_records(kind::EVENTS, values)))
}

// ---------------------------------------------------------------------------
// Attributions

/// Read/write façade for [`AttributionRecord`]s.
pub struct AttributionRepository<'a> {
    store: &'a LogStore,
}

impl<'a> AttributionRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    /// Appends an attribution; the latest append per event supersedes.
    pub fn upsert(&self, record: &AttributionRecord) -> Result<(), StoreError> {
        self.store
            .append(kind::ATTRIBUTIONS, &serde_json::to_value(record)?)
    }

    /// The current attribution per event ID.
    pub fn current_map(&self) -> Result<HashMap<EventId, AttributionRecord>, StoreError> {
        let raw = self.store.read_all(kind::ATTRIBUTIONS)?;
        let mut current = HashMap::new();
        for record in decode_records::<AttributionRecord>(kind::ATTRIBUTIONS, raw) {
            current.insert(record.event_id.clone(), record);
        }
        Ok(current)
    }

    pub fn current(&self, event_id: &EventId) -> Result<Option<AttributionRecord>, StoreError> {
        Ok(self.current_map()?.remove(event_id))
    }
}

fn fold_attributions(records: Vec<AttributionRecord>) -> Vec<AttributionRecord> {
    let mut index: HashMap<EventId, usize> = HashMap::new();
    let mut current: Vec<AttributionRecord> = Vec::new();
    for record in records {
        if let Some(&at) = index.get(&record.event_id) {
            current[at] = record;
        } else {
            index.insert(record.event_id.clone(), current.len());
            current.push(record);
        }
    }
    current.sort_by(|a, b| (a.timestamp_ms, &a.event_id).cmp(&(b.timestamp_ms, &b.event_id)));
    current
}

fn reduce_attributions(values: Vec<Value>) -> Vec<Value> {
    encode_records(fold_attributions(decode_records(kind::ATTRIBUTIONS, values)))
}

// ---------------------------------------------------------------------------
// Budgets

/// Read/write façade for [`Budget`] records.
pub struct BudgetRepository<'a> {
    store: &'a LogStore,
}

impl<'a> BudgetRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    pub fn upsert(&self, budget: &Budget) -> Result<(), StoreError> {
        self.store
            .append(kind::BUDGETS, &serde_json::to_value(budget)?)
    }

    /// One logical budget per project; latest `updated_at` wins.
    pub fn list(&self) -> Result<Vec<Budget>, StoreError> {
        let raw = self.store.read_all(kind::BUDGETS)?;
        Ok(fold_budgets(decode_records(kind::BUDGETS, raw)))
    }

    pub fn get(&self, key: &ProjectKey) -> Result<Option<Budget>, StoreError> {
        Ok(self.list()?.into_iter().find(|b| b.project_key == *key))
    }
}

fn fold_budgets(records: Vec<Budget>) -> Vec<Budget> {
    let mut latest: HashMap<ProjectKey, Budget> = HashMap::new();
    for budget in records {
        match latest.get(&budget.project_key) {
            Some(existing) if existing.updated_at > budget.updated_at => {}
            _ => {
                latest.insert(budget.project_key.clone(), budget);
            }
        }
    }
    let mut budgets: Vec<Budget> = latest.into_values().collect();
    budgets.sort_by(|a, b| a.project_key.cmp(&b.project_key));
    budgets
}

fn reduce_budgets(values: Vec<Value>) -> Vec<Value> {
    encode_records(fold_budgets(decode_records(kind::BUDGETS, values)))
}

// ---------------------------------------------------------------------------
// Sync cursors

/// Per-source incremental fetch progress.
///
/// `last_fetched_ms` is the maximum *observed* event timestamp, not the
/// request end time, so late-arriving events are not skipped forever. It
/// never decreases across successful syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub source: String,
    pub last_fetched_ms: i64,
    pub last_sync_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Read/write façade for [`SyncCursor`] records.
pub struct CursorRepository<'a> {
    store: &'a LogStore,
}

impl<'a> CursorRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a LogStore) -> Self {
        Self { store }
    }

    pub fn get(&self, source: &str) -> Result<Option<SyncCursor>, StoreError> {
        Ok(self.list()?.into_iter().find(|c| c.source == source))
    }

    pub fn list(&self) -> Result<Vec<SyncCursor>, StoreError> {
        let raw = self.store.read_all(kind::CURSORS)?;
        Ok(fold_cursors(decode_records(kind::CURSORS, raw)))
    }

    /// Records a successful sync, advancing the high-water mark to the
    /// maximum observed event timestamp and clearing any prior error.
    pub fn record_success(
        &self,
        source: &str,
        max_seen_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<SyncCursor, StoreError> {
        let previous = self.get(source)?.map_or(0, |c| c.last_fetched_ms);
        let cursor = SyncCursor {
            source: source.to_string(),
            last_fetched_ms: max_seen_ms.map_or(previous, |seen| seen.max(previous)),
            last_sync_at_ms: now_ms,
            last_error: None,
        };
        self.store
            .append(kind::CURSORS, &serde_json::to_value(&cursor)?)?;
        Ok(cursor)
    }

    /// Records a failed sync: the high-water mark stays exactly where it
    /// was, only the error and sync time change.
    pub fn record_failure(
        &self,
        source: &str,
        error: &str,
        now_ms: i64,
    ) -> Result<SyncCursor, StoreError> {
        let previous = self.get(source)?.map_or(0, |c| c.last_fetched_ms);
        let cursor = SyncCursor {
            source: source.to_string(),
            last_fetched_ms: previous,
            last_sync_at_ms: now_ms,
            last_error: Some(error.to_string()),
        };
        self.store
            .append(kind::CURSORS, &serde_json::to_value(&cursor)?)?;
        Ok(cursor)
    }
}

/// Per source: the high-water mark merges as the max across records (it
/// must never regress under interleaved writers); the remaining fields
/// come from the record with the latest `last_sync_at_ms`.
fn fold_cursors(records: Vec<SyncCursor>) -> Vec<SyncCursor> {
    let mut latest: HashMap<String, SyncCursor> = HashMap::new();
    for cursor in records {
        match latest.get_mut(&cursor.source) {
            Some(existing) => {
                let high_water = existing.last_fetched_ms.max(cursor.last_fetched_ms);
                if cursor.last_sync_at_ms >= existing.last_sync_at_ms {
                    *existing = cursor;
                }
                existing.last_fetched_ms = high_water;
            }
            None => {
                latest.insert(cursor.source.clone(), cursor);
            }
        }
    }
    let mut cursors: Vec<SyncCursor> = latest.into_values().collect();
    cursors.sort_by(|a, b| a.source.cmp(&b.source));
    cursors
}

fn reduce_cursors(values: Vec<Value>) -> Vec<Value> {
    encode_records(fold_cursors(decode_records(kind::CURSORS, values)))
}

// ---------------------------------------------------------------------------
// Compaction entry point

/// Compacts every kind with its merge rule, then rebuilds the derived
/// day-aggregate index if events or attributions were compacted.
pub fn compact_all(store: &LogStore) -> Result<Vec<(&'static str, CompactOutcome)>, StoreError> {
    let reducers: &[(&str, fn(Vec<Value>) -> Vec<Value>)] = &[
        (kind::PROJECTS, reduce_projects),
        (kind::SESSIONS, reduce_sessions),
        (kind::EVENTS, reduce_events),
        (kind::ATTRIBUTIONS, reduce_attributions),
        (kind::BUDGETS, reduce_budgets),
        (kind::CURSORS, reduce_cursors),
    ];

    let mut outcomes = Vec::with_capacity(reducers.len());
    for (kind_name, reduce) in reducers {
        outcomes.push((*kind_name, store.compact(kind_name, reduce)?));
    }

    let derived_changed = outcomes.iter().any(|(kind_name, outcome)| {
        matches!(outcome, CompactOutcome::Compacted { .. })
            && (*kind_name == kind::EVENTS || *kind_name == kind::ATTRIBUTIONS)
    });
    if derived_changed {
        aggregate::rebuild_day_index(store, now_epoch_ms())?;
    }

    Ok(outcomes)
}
