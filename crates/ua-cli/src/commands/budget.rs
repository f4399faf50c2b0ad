//! Budget commands: monthly caps and alert thresholds per project.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike};

use ua_core::{Budget, ProjectKey};
use ua_store::{BudgetRepository, LogStore, totals_by_project};

use crate::config::Config;

pub fn set(
    config: &Config,
    project: &str,
    monthly_cents: i64,
    thresholds: Vec<f32>,
) -> Result<()> {
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;
    let key = ProjectKey::new(project).context("invalid project key")?;

    let budget = Budget::new(
        key,
        monthly_cents,
        thresholds,
        chrono::Utc::now().timestamp_millis(),
    );
    BudgetRepository::new(&store).upsert(&budget)?;

    println!(
        "budget for {}: {} cents / month, thresholds {:?}",
        budget.project_key, budget.monthly_cents, budget.alert_thresholds
    );
    Ok(())
}

pub fn list(config: &Config) -> Result<()> {
    let store = LogStore::open(&config.data_dir).context("failed to open store")?;
    let budgets = BudgetRepository::new(&store).list()?;
    if budgets.is_empty() {
        println!("no budgets set");
        return Ok(());
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let month_start = start_of_month_ms(now_ms);
    let totals = totals_by_project(&store, month_start, now_ms)?;

    for budget in budgets {
        let spent = totals
            .iter()
            .find(|t| t.project_key == budget.project_key)
            .map_or(0, |t| t.total_cents);
        let crossed = budget.crossed_thresholds(spent);

        let alert = if crossed.is_empty() {
            String::new()
        } else {
            format!("  [crossed: {crossed:?}]")
        };
        println!(
            "  {}: {spent} / {} cents this month{alert}",
            budget.project_key, budget.monthly_cents
        );
    }
    Ok(())
}

/// Start of the current UTC calendar month in epoch milliseconds.
fn start_of_month_ms(now_ms: i64) -> i64 {
    DateTime::from_timestamp_millis(now_ms)
        .and_then(|dt| dt.date_naive().with_day(1))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or(0, |naive| naive.and_utc().timestamp_millis())
}
