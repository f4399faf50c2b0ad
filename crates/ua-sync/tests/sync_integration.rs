//! Integration tests for the sync coordinator over a real store.
//!
//! Uses a scripted in-memory source so the full pipeline runs: cursor →
//! lookback window → fetch (with retry) → event upsert → attribution →
//! cursor persistence.

use std::sync::Mutex;

use ua_core::{EventId, InstanceId, ProjectKey, ProjectSession, SessionId, TokenUsage, UsageEvent};
use ua_store::{
    AttributionRepository, CursorRepository, EventRepository, LogStore, SessionRepository, kind,
};
use ua_sync::{RetryConfig, SourceError, SyncError, SyncOptions, UsageSource, sync_source};

/// A source that replays scripted responses and records its call windows.
struct MockSource {
    responses: Mutex<Vec<Result<Vec<UsageEvent>, SourceError>>>,
    calls: Mutex<Vec<(i64, i64)>>,
}

impl MockSource {
    fn new(responses: Vec<Result<Vec<UsageEvent>, SourceError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(i64, i64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl UsageSource for MockSource {
    fn source_id(&self) -> &str {
        "api"
    }

    async fn fetch_usage_events(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageEvent>, SourceError> {
        self.calls.lock().unwrap().push((start_ms, end_ms));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            responses.remove(0)
        }
    }
}

fn event(id: &str, ts: i64, cost: i64) -> UsageEvent {
    UsageEvent {
        event_id: EventId::new(id).unwrap(),
        timestamp_ms: ts,
        model: "claude-sonnet-4".to_string(),
        tokens: TokenUsage::default(),
        cost_cents: cost,
        source: "api".to_string(),
    }
}

fn focused_session(key: &str) -> ProjectSession {
    ProjectSession {
        id: SessionId::new(format!("s-{key}")).unwrap(),
        project_key: ProjectKey::new(key).unwrap(),
        start_ms: 0,
        end_ms: None,
        focused: true,
        idle: false,
        instance_id: InstanceId::new("window-1").unwrap(),
    }
}

/// Retry options with delays short enough for tests.
fn fast_options() -> SyncOptions {
    SyncOptions {
        lookback_ms: 5_000,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        },
    }
}

#[tokio::test]
async fn sync_attributes_events_and_advances_cursor() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();
    SessionRepository::new(&store)
        .create(&focused_session("p1"))
        .unwrap();

    let source = MockSource::new(vec![Ok(vec![event("e1", 1_000, 5), event("e2", 2_000, 7)])]);
    let report = sync_source(&store, &source, 0, 10_000, 99, &fast_options())
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.attributed, 2);
    assert_eq!(report.max_seen_ms, Some(2_000));

    let events = EventRepository::new(&store).list().unwrap();
    assert_eq!(events.len(), 2);

    let attribution = AttributionRepository::new(&store)
        .current(&EventId::new("e1").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(attribution.project_key.as_str(), "p1");
    assert!((attribution.confidence.value() - 1.0).abs() < f32::EPSILON);

    let cursor = CursorRepository::new(&store).get("api").unwrap().unwrap();
    assert_eq!(cursor.last_fetched_ms, 2_000);
    assert_eq!(cursor.last_sync_at_ms, 99);
    assert!(cursor.last_error.is_none());
}

#[tokio::test]
async fn resyncing_the_same_events_is_idempotent() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();
    SessionRepository::new(&store)
        .create(&focused_session("p1"))
        .unwrap();

    let batch = vec![event("e1", 1_000, 5), event("e2", 2_000, 7)];
    let source = MockSource::new(vec![Ok(batch.clone()), Ok(batch)]);

    sync_source(&store, &source, 0, 10_000, 99, &fast_options())
        .await
        .unwrap();
    let second = sync_source(&store, &source, 0, 10_000, 100, &fast_options())
        .await
        .unwrap();

    assert_eq!(second.inserted, 0);
    assert_eq!(second.attributed, 0);
    assert_eq!(EventRepository::new(&store).list().unwrap().len(), 2);
    // No redundant attribution appends either.
    assert_eq!(store.read_all(kind::ATTRIBUTIONS).unwrap().len(), 2);
}

#[tokio::test]
async fn lookback_window_widens_the_requested_start() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();
    CursorRepository::new(&store)
        .record_success("api", Some(100_000), 0)
        .unwrap();

    let source = MockSource::new(vec![Ok(Vec::new())]);
    let report = sync_source(&store, &source, 200_000, 300_000, 99, &fast_options())
        .await
        .unwrap();

    assert_eq!(report.effective_start_ms, 195_000);
    assert_eq!(source.calls(), vec![(195_000, 300_000)]);
}

#[tokio::test]
async fn failed_fetch_freezes_cursor_and_records_error() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();
    CursorRepository::new(&store)
        .record_success("api", Some(100_000), 0)
        .unwrap();

    let source = MockSource::new(vec![Err(SourceError::Api {
        status: Some(400),
        message: "bad request".to_string(),
    })]);
    let result = sync_source(&store, &source, 0, 10_000, 99, &fast_options()).await;

    assert!(matches!(result, Err(SyncError::Fetch { .. })));
    // Not retryable: exactly one call.
    assert_eq!(source.calls().len(), 1);

    let cursor = CursorRepository::new(&store).get("api").unwrap().unwrap();
    assert_eq!(cursor.last_fetched_ms, 100_000);
    assert_eq!(cursor.last_sync_at_ms, 99);
    assert!(cursor.last_error.as_deref().unwrap().contains("API error"));
}

#[tokio::test]
async fn rate_limit_is_retried_then_succeeds() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();

    let source = MockSource::new(vec![
        Err(SourceError::RateLimited {
            retry_after_ms: Some(2),
        }),
        Ok(vec![event("e1", 1_000, 5)]),
    ]);
    let report = sync_source(&store, &source, 0, 10_000, 99, &fast_options())
        .await
        .unwrap();

    assert_eq!(source.calls().len(), 2);
    assert_eq!(report.fetched, 1);
    let cursor = CursorRepository::new(&store).get("api").unwrap().unwrap();
    assert!(cursor.last_error.is_none());
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();

    let source = MockSource::new(vec![
        Err(SourceError::Request("timeout".to_string())),
        Err(SourceError::Request("timeout".to_string())),
        Err(SourceError::Request("timeout".to_string())),
    ]);
    let result = sync_source(&store, &source, 0, 10_000, 99, &fast_options()).await;

    assert_eq!(source.calls().len(), 3);
    match result {
        Err(SyncError::Fetch { error, .. }) => {
            assert!(matches!(error, SourceError::Request(_)));
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_fetch_keeps_high_water_mark() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();
    CursorRepository::new(&store)
        .record_failure("api", "old failure", 0)
        .unwrap();
    CursorRepository::new(&store)
        .record_success("api", Some(100_000), 1)
        .unwrap();

    let source = MockSource::new(vec![Ok(Vec::new())]);
    let report = sync_source(&store, &source, 0, 10_000, 99, &fast_options())
        .await
        .unwrap();

    assert_eq!(report.max_seen_ms, None);
    let cursor = CursorRepository::new(&store).get("api").unwrap().unwrap();
    assert_eq!(cursor.last_fetched_ms, 100_000);
    assert!(cursor.last_error.is_none());
}

#[tokio::test]
async fn cursor_is_monotonic_across_successful_syncs() {
    let temp = tempfile::tempdir().unwrap();
    let store = LogStore::open(temp.path()).unwrap();

    let source = MockSource::new(vec![
        Ok(vec![event("e1", 5_000, 1)]),
        Ok(vec![event("e2", 3_000, 1)]),
        Ok(vec![event("e3", 9_000, 1)]),
    ]);

    let mut marks = Vec::new();
    for now in 0..3 {
        sync_source(&store, &source, 0, 10_000, now, &fast_options())
            .await
            .unwrap();
        marks.push(
            CursorRepository::new(&store)
                .get("api")
                .unwrap()
                .unwrap()
                .last_fetched_ms,
        );
    }

    assert_eq!(marks, vec![5_000, 5_000, 9_000]);
}
