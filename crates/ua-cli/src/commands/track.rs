//! Track command: consume host editor signals and segment sessions.
//!
//! The host delivers signals as JSONL on stdin, one object per line; an
//! interval timer drives the idle check. Both run as tasks on one event
//! loop — file writes suspend only the task, and nothing here spans OS
//! threads.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use ua_core::{
    Project, SegmentAction, Segmenter, SessionPatch, WorkspaceIdentity, best_effort,
};
use ua_store::{LogStore, ProjectRepository, SessionRepository, StoreError};

use crate::config::Config;
use crate::instance::require_instance_identity;

/// One host signal, as delivered on stdin.
///
/// This is the whole surface the segmenter sees; no host API types leak
/// past it.
#[derive(Debug, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
enum HostSignal {
    /// The workspace changed (or closed entirely).
    WorkspaceChanged {
        #[serde(default)]
        workspace: Option<WorkspaceIdentity>,
    },
    /// The window gained or lost focus.
    FocusChanged { focused: bool },
    /// A document edit, active-editor change, or similar.
    Activity,
}

pub fn run(config: &Config) -> Result<()> {
    let identity = require_instance_identity(&config.data_dir)?;
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;
    let mut segmenter = Segmenter::new(identity.id()?, config.segmenter_config());

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let result = runtime.block_on(track_loop(&store, &mut segmenter, config.idle_poll_interval_ms));

    // The host is gone; an unclosed segment stays visible as open until
    // superseded, so a lost close here is tolerable.
    let actions = segmenter.dispose(now_ms());
    best_effort("close session on dispose", apply_actions(&store, &actions));
    result
}

async fn track_loop(
    store: &LogStore,
    segmenter: &mut Segmenter,
    poll_interval_ms: u64,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(Duration::from_millis(poll_interval_ms.max(1_000)));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read host signals from stdin")? {
                    Some(line) => handle_line(store, segmenter, &line)?,
                    None => return Ok(()),
                }
            }
            _ = poll.tick() => {
                let actions = segmenter.poll_idle(now_ms());
                apply_actions(store, &actions)?;
            }
        }
    }
}

fn handle_line(store: &LogStore, segmenter: &mut Segmenter, line: &str) -> Result<()> {
    if line.trim().is_empty() {
        return Ok(());
    }
    let signal: HostSignal = match serde_json::from_str(line) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed host signal");
            return Ok(());
        }
    };

    let now = now_ms();
    let actions = match &signal {
        HostSignal::WorkspaceChanged { workspace } => {
            if let Some(ws) = workspace {
                // Losing this write only degrades display names.
                best_effort(
                    "project registry update",
                    ProjectRepository::new(store).upsert(&Project::from_workspace(ws, now)),
                );
            }
            segmenter.on_workspace_changed(workspace.as_ref(), now)
        }
        HostSignal::FocusChanged { focused } => segmenter.on_focus_changed(*focused, now),
        HostSignal::Activity => segmenter.on_activity(now),
    };
    apply_actions(store, &actions)?;
    Ok(())
}

fn apply_actions(store: &LogStore, actions: &[SegmentAction]) -> Result<(), StoreError> {
    let sessions = SessionRepository::new(store);
    for action in actions {
        match action {
            SegmentAction::Open(session) => sessions.create(session)?,
            SegmentAction::Close { id, end_ms } => {
                sessions.update(id, &SessionPatch::close_at(*end_ms))?;
            }
        }
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
