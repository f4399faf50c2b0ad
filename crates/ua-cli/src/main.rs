use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ua_cli::commands::{budget, compact, init, report, status, sync, track};
use ua_cli::{BudgetAction, Cli, Commands, Config};

/// Load configuration for a command invocation.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match &cli.command {
        Some(Commands::Init { label }) => {
            let config = load_config(cli.config.as_deref())?;
            init::run(&config, label.as_deref())?;
        }
        Some(Commands::Track) => {
            let config = load_config(cli.config.as_deref())?;
            track::run(&config)?;
        }
        Some(Commands::Sync { start, end }) => {
            let config = load_config(cli.config.as_deref())?;
            sync::run(&config, *start, *end)?;
        }
        Some(Commands::Report {
            days,
            project,
            heatmap,
            json,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            report::run(&config, *days, project.as_deref(), *heatmap, *json)?;
        }
        Some(Commands::Status) => {
            let config = load_config(cli.config.as_deref())?;
            status::run(&config)?;
        }
        Some(Commands::Compact) => {
            let config = load_config(cli.config.as_deref())?;
            compact::run(&config)?;
        }
        Some(Commands::Budget(action)) => {
            let config = load_config(cli.config.as_deref())?;
            match action {
                BudgetAction::Set {
                    project,
                    monthly_cents,
                    thresholds,
                } => budget::set(&config, project, *monthly_cents, thresholds.clone())?,
                BudgetAction::List => budget::list(&config)?,
            }
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
