//! CLI entry point for the folio rebalancer.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use folio::Exchange;
use folio_rebalancer::commands::{self, RunOptions};
use folio_rebalancer::config::Config;
use folio_rebalancer::error::Error;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Group-weighted portfolio rebalancer for a Korean brokerage account")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current quote for a ticker
    Price {
        ticker: String,

        /// Preferred exchange for foreign tickers (NAS, NYS, AMS)
        #[arg(long)]
        exchange: Option<Exchange>,
    },

    /// Show the close on or before a date (YYYY-MM-DD)
    History {
        ticker: String,
        date: NaiveDate,

        #[arg(long)]
        exchange: Option<Exchange>,
    },

    /// Show 1Y / 6M / 1M change rates
    Changes {
        ticker: String,

        /// Reference date; defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,

        #[arg(long)]
        exchange: Option<Exchange>,
    },

    /// Value the portfolio and show the rebalance plan
    Plan {
        /// Path to portfolio.json
        portfolio: PathBuf,
    },

    /// Compute the plan, confirm, and execute rebalance orders
    Run {
        /// Path to portfolio.json
        portfolio: PathBuf,

        /// Show orders without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Compare current group weights vs targets
    Reconcile {
        /// Path to portfolio.json
        portfolio: PathBuf,
    },

    /// Check credentials and brokerage connection
    Status,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        if let Some(Error::Aborted(msg)) = e.downcast_ref::<Error>() {
            eprintln!("{msg}");
            process::exit(0);
        }
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Price { ticker, exchange } => commands::show_price(&config, &ticker, exchange)?,
        Command::History {
            ticker,
            date,
            exchange,
        } => commands::show_history(&config, &ticker, date, exchange)?,
        Command::Changes {
            ticker,
            as_of,
            exchange,
        } => commands::show_changes(&config, &ticker, as_of, exchange)?,
        Command::Plan { portfolio } => commands::show_plan(&config, &portfolio)
            .with_context(|| format!("planning {}", portfolio.display()))?,
        Command::Run {
            portfolio,
            dry_run,
            force,
        } => {
            let opts = RunOptions {
                dry_run,
                force,
                portfolio,
            };
            commands::run(&config, &opts)?
        }
        Command::Reconcile { portfolio } => commands::run_reconcile(&config, &portfolio)
            .with_context(|| format!("reconciling {}", portfolio.display()))?,
        Command::Status => commands::check_status(&config)?,
    }
    Ok(())
}
