//! Sync command: pull usage events from the configured source.

use anyhow::{Context, Result};

use ua_store::LogStore;
use ua_sync::{HttpSource, sync_source};

use crate::config::Config;

pub fn run(config: &Config, start: Option<i64>, end: Option<i64>) -> Result<()> {
    let api = config.api.as_ref().context(
        "No usage source configured. Add an [api] section with base_url and api_key to config.toml.",
    )?;
    let source = HttpSource::new(&api.base_url, &api.api_key, &api.source)?;
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;

    let now = chrono::Utc::now().timestamp_millis();
    let start = start.unwrap_or(0);
    let end = end.unwrap_or(now);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let report = runtime.block_on(sync_source(
        &store,
        &source,
        start,
        end,
        now,
        &config.sync_options(),
    ))?;

    println!(
        "synced {}: {} fetched, {} new, {} attributed (window {}..{})",
        report.source, report.fetched, report.inserted, report.attributed,
        report.effective_start_ms, report.end_ms,
    );
    Ok(())
}
