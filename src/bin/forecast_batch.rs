//! Forecast Batch Runner CLI
//!
//! One-shot entrypoints for batch maintenance without standing up the HTTP
//! server: run a full generation pass over every active (product, market)
//! pair, or purge stale forecast rows. Useful for cron jobs and for
//! regenerating a database by hand.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin forecast_batch -- --database ./pricecast.db
//! cargo run --bin forecast_batch -- run --as-of 2026-08-22 --force
//! cargo run --bin forecast_batch -- run --chunk-size 25 --workers 8
//! cargo run --bin forecast_batch -- purge --before 2026-08-01
//! ```
//!
//! # Exit Codes
//!
//! - 0: Completed, no failed pairs
//! - 1: Run completed but some pairs failed
//! - 2: Could not open the store or build the worker pool

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricecast_backend::config::Config;
use pricecast_backend::forecast::{BatchOrchestrator, ForecastStore, RunReport};

/// Batch maintenance for the forecast store
#[derive(Parser, Debug)]
#[command(name = "forecast_batch")]
#[command(about = "Generate seven-day forecasts for every active (product, market) pair")]
struct Cli {
    /// Path to the SQLite database (defaults to the configured path)
    #[arg(short, long, env = "DATABASE_PATH", global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one generation batch over all active pairs (the default)
    Run {
        /// Generation date, YYYY-MM-DD (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Overwrite manually pinned forecasts instead of skipping them
        #[arg(short, long)]
        force: bool,

        /// Pairs per work chunk (defaults to the configured chunk size)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Worker threads (defaults to max(4, cores))
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Delete forecast rows older than a cutoff; overridden rows are kept
    Purge {
        /// Remove rows with a target date strictly before this date
        #[arg(long)]
        before: NaiveDate,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricecast_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(path) = cli.database {
        config.storage.database_path = path;
    }

    let store = match ForecastStore::open(&config.storage.database_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open store: {e}");
            std::process::exit(2);
        }
    };

    match cli.command.unwrap_or(Commands::Run {
        as_of: None,
        force: false,
        chunk_size: None,
        workers: None,
    }) {
        Commands::Run {
            as_of,
            force,
            chunk_size,
            workers,
        } => {
            if let Some(size) = chunk_size {
                config.batch.chunk_size = size;
            }
            if let Some(workers) = workers {
                config.batch.worker_threads = workers;
            }
            let as_of = as_of.unwrap_or_else(|| Utc::now().date_naive());
            run_batch(store, &config, as_of, force)
        }
        Commands::Purge { before } => {
            let purged = store.purge_stale(before)?;
            println!("✓ Purged {purged} stale forecast rows older than {before}");
            Ok(())
        }
    }
}

fn run_batch(store: ForecastStore, config: &Config, as_of: NaiveDate, force: bool) -> Result<()> {
    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║                 PRICECAST FORECAST BATCH RUNNER                ║");
    println!("╚════════════════════════════════════════════════════════════════╝");
    println!();
    println!("Database:  {}", config.storage.database_path);
    println!("As of:     {as_of}");
    println!("Force:     {force}");
    println!();

    let orchestrator = match BatchOrchestrator::new(store, &config.batch)
        .context("Failed to build batch orchestrator")
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(2);
        }
    };

    let started = std::time::Instant::now();
    let report = orchestrator.run_blocking(as_of, force);
    print_report(&report, started.elapsed());

    if report.status.failed > 0 {
        println!(
            "\n⚠️  {} pair(s) failed; see chunk errors above",
            report.status.failed
        );
        std::process::exit(1);
    }

    println!("\n✓ All pairs processed");
    Ok(())
}

fn print_report(report: &RunReport, elapsed: std::time::Duration) {
    println!("=== Chunk Results ===\n");
    println!(
        "{:>6} {:>8} {:>10} {:>9} {:>8} {:>10}",
        "Chunk", "Pairs", "Succeeded", "Skipped", "Failed", "Anomalies"
    );
    println!("{}", "-".repeat(56));
    for chunk in &report.chunk_outcomes {
        println!(
            "{:>6} {:>8} {:>10} {:>9} {:>8} {:>10}",
            chunk.index, chunk.pairs, chunk.succeeded, chunk.skipped, chunk.failed, chunk.anomalies
        );
        for err in &chunk.errors {
            println!("         ⚠️  {err}");
        }
    }

    let status = &report.status;
    println!();
    println!("=== Run Summary ===\n");
    println!("  Run ID:       {}", status.run_id);
    println!("  Pairs:        {}", status.total_pairs);
    println!("  Succeeded:    {}", status.succeeded);
    println!("  Skipped:      {} (insufficient history)", status.skipped);
    println!("  Failed:       {}", status.failed);
    println!("  Anomalies:    {}", status.anomalies);
    println!("  Purged rows:  {}", status.purged);
    println!("  Elapsed:      {:.2}s", elapsed.as_secs_f64());
}
