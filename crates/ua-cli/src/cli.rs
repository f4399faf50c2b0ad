//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Attribute AI-assistant usage costs to project workspaces.
#[derive(Debug, Parser)]
#[command(name = "ua", version, about)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a config file (defaults to the platform config dir).
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize this IDE instance's identity.
    Init {
        /// Human-friendly label (defaults to the hostname).
        #[arg(long)]
        label: Option<String>,
    },
    /// Read host editor signals from stdin and segment sessions.
    Track,
    /// Pull usage events from the configured source and attribute them.
    Sync {
        /// Window start in epoch milliseconds (default 0).
        #[arg(long)]
        start: Option<i64>,
        /// Window end in epoch milliseconds (default now).
        #[arg(long)]
        end: Option<i64>,
    },
    /// Report attributed spend.
    Report {
        /// How many days back to report over.
        #[arg(long, default_value_t = 30)]
        days: i64,
        /// Show a per-model breakdown for one project key.
        #[arg(long)]
        project: Option<String>,
        /// Include the hourly cost heatmap.
        #[arg(long)]
        heatmap: bool,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show storage and sync-cursor status.
    Status,
    /// Compact all logs and rebuild the derived index.
    Compact,
    /// Manage project budgets.
    #[command(subcommand)]
    Budget(BudgetAction),
}

#[derive(Debug, Subcommand)]
pub enum BudgetAction {
    /// Set (or replace) a project's monthly budget.
    Set {
        /// Project key the budget applies to.
        #[arg(long)]
        project: String,
        /// Monthly cap in cents.
        #[arg(long)]
        monthly_cents: i64,
        /// Ascending alert thresholds as fractions, e.g. 0.5,0.8,1.0
        #[arg(long, value_delimiter = ',')]
        thresholds: Vec<f32>,
    },
    /// List budgets with current-month spend.
    List,
}
