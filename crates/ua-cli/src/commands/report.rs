//! Report command: attributed spend for dashboard-style consumption.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use ua_core::{AttributionRecord, ProjectKey};
use ua_store::{
    LogStore, ModelBreakdown, ProjectTotals, UnattributedSummary, conflict_summary,
    hourly_heatmap, project_breakdown, totals_by_project, unattributed_summary,
};

use crate::config::Config;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    start_ms: i64,
    end_ms: i64,
    totals: Vec<ProjectTotals>,
    unattributed: UnattributedSummary,
    conflicts: Vec<AttributionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    breakdown: Option<Vec<ModelBreakdown>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heatmap: Option<Vec<i64>>,
}

pub fn run(
    config: &Config,
    days: i64,
    project: Option<&str>,
    heatmap: bool,
    json: bool,
) -> Result<()> {
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;

    let end_ms = chrono::Utc::now().timestamp_millis();
    let start_ms = end_ms - days.max(1).saturating_mul(86_400_000);

    let report = Report {
        start_ms,
        end_ms,
        totals: totals_by_project(&store, start_ms, end_ms)?,
        unattributed: unattributed_summary(&store, start_ms, end_ms)?,
        conflicts: conflict_summary(&store, start_ms, end_ms)?,
        breakdown: match project {
            Some(key) => {
                let key = ProjectKey::new(key).context("invalid project key")?;
                Some(project_breakdown(&store, &key, start_ms, end_ms)?)
            }
            None => None,
        },
        heatmap: if heatmap {
            Some(hourly_heatmap(&store, start_ms, end_ms)?.to_vec())
        } else {
            None
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report, days));
    }
    Ok(())
}

fn render(report: &Report, days: i64) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Project spend, last {days} days:");
    if report.totals.is_empty() {
        let _ = writeln!(out, "  (no events)");
    }
    for totals in &report.totals {
        let _ = writeln!(
            out,
            "  {:<20} {:>6} events  {:>10}",
            totals.project_key,
            totals.event_count,
            format_cents(totals.total_cents)
        );
    }

    let _ = writeln!(
        out,
        "Unattributed: {} events, {}",
        report.unattributed.event_count,
        format_cents(report.unattributed.total_cents)
    );

    if !report.conflicts.is_empty() {
        let _ = writeln!(out, "Needs review ({} attributions):", report.conflicts.len());
        for conflict in &report.conflicts {
            let _ = writeln!(
                out,
                "  {} -> {} (confidence {}, {})",
                conflict.event_id, conflict.project_key, conflict.confidence, conflict.reason
            );
        }
    }

    if let Some(breakdown) = &report.breakdown {
        let _ = writeln!(out, "Model breakdown:");
        for model in breakdown {
            let _ = writeln!(
                out,
                "  {:<28} {:>6} events  {:>10} tokens  {:>10}",
                model.model,
                model.event_count,
                model.tokens.total(),
                format_cents(model.total_cents)
            );
        }
    }

    if let Some(heatmap) = &report.heatmap {
        let _ = writeln!(out, "Hourly cost (UTC):");
        for (hour, cents) in heatmap.iter().enumerate() {
            if *cents > 0 {
                let _ = writeln!(out, "  {hour:02}:00  {}", format_cents(*cents));
            }
        }
    }

    out
}

/// Formats integer cents as a dollar amount.
fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}
