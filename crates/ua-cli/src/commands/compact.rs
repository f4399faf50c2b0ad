//! Compact command: fold every log to its canonical form.

use anyhow::{Context, Result};

use ua_store::{CompactOutcome, LogStore, compact_all};

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;

    for (kind_name, outcome) in compact_all(&store)? {
        match outcome {
            CompactOutcome::Compacted { records } => {
                println!("  {kind_name}: {records} records");
            }
            CompactOutcome::Skipped => {
                println!("  {kind_name}: skipped (another process is compacting)");
            }
        }
    }
    Ok(())
}
