//! Append-only record logs with snapshots and lock-protected compaction.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StoreError;

/// Age after which a compaction lock is assumed to belong to a crashed
/// process and is cleared.
pub const LOCK_STALE_MS: i64 = 5 * 60 * 1000;

/// Outcome of a compaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactOutcome {
    /// The kind was compacted down to this many canonical records.
    Compacted { records: usize },
    /// Another process holds the compaction lock; nothing was done.
    Skipped,
}

/// Contents of a `<kind>.compact.lock` marker file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    pid: u32,
    created_at: i64,
}

/// Durable, multi-process-writable record log per entity kind.
///
/// The store knows nothing about business types: records are opaque JSON
/// values, and compaction receives its merge rule from the caller.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory holding all log, snapshot and index files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn log_path(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}.log"))
    }

    pub(crate) fn snapshot_path(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}.snapshot.json"))
    }

    fn lock_path(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}.compact.lock"))
    }

    /// Appends one record as a single JSONL line.
    ///
    /// The line is written with one `write_all` on an append-mode handle;
    /// at record sizes up to a few KB the OS append guarantee keeps
    /// concurrent writers from interleaving, so the hot path takes no
    /// lock.
    pub fn append(&self, kind: &str, record: &Value) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(kind))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Reads every record of a kind.
    ///
    /// Prefers the snapshot as a parsed base: the reduced log's first N
    /// lines correspond to the snapshot's N records, so only the tail
    /// beyond it is scanned. A missing or corrupt snapshot falls back to
    /// a full scan. Unparsable lines (e.g. a torn trailing write from a
    /// crash) are skipped, never fatal.
    pub fn read_all(&self, kind: &str) -> Result<Vec<Value>, StoreError> {
        let (mut records, skip) = match self.read_snapshot(kind) {
            Some(records) => {
                let len = records.len();
                (records, len)
            }
            None => (Vec::new(), 0),
        };
        records.extend(self.scan_log(kind, skip)?);
        Ok(records)
    }

    fn read_snapshot(&self, kind: &str) -> Option<Vec<Value>> {
        let path = self.snapshot_path(kind);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(kind, path = ?path, error = %e, "snapshot unreadable, scanning log");
                return None;
            }
        };

        match serde_json::from_str::<Vec<Value>>(&content) {
            Ok(records) => Some(records),
            Err(e) => {
                tracing::warn!(kind, error = %e, "snapshot corrupt, scanning log");
                None
            }
        }
    }

    /// Scans the log, skipping the first `skip` lines and any line that
    /// fails to parse.
    ///
    /// Reads lossily: a torn multi-byte write turns into replacement
    /// characters that fail JSON parsing and get skipped, instead of
    /// failing the whole scan.
    fn scan_log(&self, kind: &str, skip: usize) -> Result<Vec<Value>, StoreError> {
        let bytes = match fs::read(self.log_path(kind)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content.lines().collect();

        let records = lines
            .get(skip..)
            .unwrap_or(&[])
            .par_iter()
            .filter_map(|line| {
                if line.is_empty() {
                    return None;
                }
                match serde_json::from_str(line) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::trace!(kind, error = %e, "skipping malformed log line");
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    /// Compacts a kind down to its canonical record set.
    ///
    /// Exclusive: acquiring the per-kind lock file fails when another
    /// process is compacting, which is a skip, not an error. A stale lock
    /// left by a crashed process is cleared first. All mutation happens
    /// on temp files swapped in by rename, so a failed compaction leaves
    /// the original log and snapshot untouched; the lock is released in
    /// every case.
    pub fn compact(
        &self,
        kind: &str,
        reduce: impl FnOnce(Vec<Value>) -> Vec<Value>,
    ) -> Result<CompactOutcome, StoreError> {
        let Some(_guard) = CompactLock::acquire(self.lock_path(kind))? else {
            tracing::debug!(kind, "compaction lock held elsewhere, skipping");
            return Ok(CompactOutcome::Skipped);
        };

        let reduced = reduce(self.read_all(kind)?);

        let snapshot = serde_json::to_string(&reduced)?;
        write_atomic(&self.snapshot_path(kind), snapshot.as_bytes())?;

        let mut log = String::new();
        for record in &reduced {
            log.push_str(&serde_json::to_string(record)?);
            log.push('\n');
        }
        write_atomic(&self.log_path(kind), log.as_bytes())?;

        tracing::debug!(kind, records = reduced.len(), "compacted");
        Ok(CompactOutcome::Compacted {
            records: reduced.len(),
        })
    }
}

/// Writes a file via temp-file-then-atomic-rename on the same filesystem.
///
/// Concurrent readers never observe a half-written file: the old content
/// stays fully valid until the rename completes.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Holds the compaction lock file; removing it on drop guarantees release
/// on success and failure alike.
struct CompactLock {
    path: PathBuf,
}

impl CompactLock {
    /// Tries to take the lock. Returns `None` when another live process
    /// holds it.
    fn acquire(path: PathBuf) -> Result<Option<Self>, StoreError> {
        let now_ms = now_epoch_ms();
        clear_stale_lock(&path, now_ms);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    created_at: now_ms,
                };
                // The lock exists as soon as create_new succeeds; the
                // info payload is diagnostic.
                if let Err(e) = file.write_all(serde_json::to_string(&info)?.as_bytes()) {
                    tracing::warn!(path = ?path, error = %e, "failed to write lock info");
                }
                Ok(Some(Self { path }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for CompactLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = ?self.path, error = %e, "failed to release compaction lock");
        }
    }
}

/// Removes a lock file older than [`LOCK_STALE_MS`], left behind by a
/// process that crashed mid-compaction. An unparsable lock falls back to
/// its mtime for the staleness decision.
fn clear_stale_lock(path: &Path, now_ms: i64) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };

    let created_at = fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
        .map(|info| info.created_at)
        .or_else(|| {
            metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .and_then(|d| i64::try_from(d.as_millis()).ok())
        });

    let Some(created_at) = created_at else {
        return;
    };

    if now_ms.saturating_sub(created_at) > LOCK_STALE_MS {
        tracing::warn!(path = ?path, created_at, "clearing stale compaction lock");
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = ?path, error = %e, "failed to clear stale lock");
        }
    }
}
