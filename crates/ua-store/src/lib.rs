//! Storage layer for usage attribution.
//!
//! Persists every entity kind as an append-only JSONL log plus a
//! materialized snapshot, compacted under a per-kind lock file. No
//! database engine: the log files and snapshots are the only shared
//! mutable state, written to by every IDE-instance process on the
//! machine.
//!
//! # Concurrency
//!
//! Appends are single-syscall writes on an `O_APPEND` handle and take no
//! lock; at typical record sizes the OS keeps concurrent appends from
//! interleaving. Readers never lock either — they tolerate a momentarily
//! stale snapshot during a rename race because the old file stays valid
//! until the rename lands. Only compaction is exclusive, via a
//! `create_new` lock file per kind.
//!
//! # Resolution
//!
//! Lines from different processes may interleave in any order, so
//! entities always resolve by an explicit rule (latest by a monotonic
//! field, or fold-in-append-order for session patches) rather than by
//! file position alone. The same rule runs at read time and at
//! compaction time.

use std::io;

use thiserror::Error;

mod aggregate;
mod log;
mod query;
mod repo;

pub use aggregate::{DayBucket, DayIndex, INDEX_FILE, load_day_index, rebuild_day_index};
pub use log::{CompactOutcome, LOCK_STALE_MS, LogStore};
pub use query::{
    ModelBreakdown, ProjectTotals, UnattributedSummary, conflict_summary, hourly_heatmap,
    project_breakdown, totals_by_project, unattributed_summary,
};
pub use repo::{
    AttributionRepository, BudgetRepository, CursorRepository, EventRepository, ProjectRepository,
    SessionRepository, SyncCursor, compact_all, kind,
};

/// Storage errors.
///
/// Only *resource* failures surface here; malformed records and snapshots
/// are skipped at read time, never fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A record could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
