//! Status command: storage and cursor overview.

use anyhow::{Context, Result};

use ua_store::{CursorRepository, LogStore, kind, load_day_index};

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;
    println!("data dir: {}", store.dir().display());

    for kind_name in kind::ALL {
        let records = store.read_all(kind_name)?;
        println!("  {kind_name}: {} records", records.len());
    }

    let cursors = CursorRepository::new(&store).list()?;
    if cursors.is_empty() {
        println!("no sync cursors yet");
    }
    for cursor in cursors {
        let state = cursor
            .last_error
            .map_or_else(|| "ok".to_string(), |e| format!("error: {e}"));
        println!(
            "  cursor {}: high-water {} (last sync {}, {})",
            cursor.source, cursor.last_fetched_ms, cursor.last_sync_at_ms, state
        );
    }

    match load_day_index(&store)? {
        Some(index) => println!(
            "day index: {} projects (generated at {})",
            index.by_project_by_day.len(),
            index.generated_at_ms
        ),
        None => println!("day index: not built"),
    }
    Ok(())
}
