//! obs-harvest main entry point
//!
//! This is the command-line interface for the observation harvester.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use obs_harvest::config::{load_config, Config};
use obs_harvest::crawler::{
    build_http_client, CourtesyDelay, HttpListingSource, HttpPageExtractor, LinkDiscoverer,
    ScrapeExecutor,
};
use obs_harvest::output::{export_observations, load_statistics, print_statistics, ErrorLog};
use obs_harvest::state::LinkStateReconciler;
use obs_harvest::storage::{LinkSetStore, ObservationStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// obs-harvest: a resumable observation scraper
///
/// Discovers observation links from a paginated listing, scrapes one record
/// per link into an append-only log, and exports the log as CSV. Every run can
/// be interrupted and resumed without losing or duplicating work.
#[derive(Parser, Debug)]
#[command(name = "obs-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable observation scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the listing and add new observation links to the pending set
    Discover {
        /// Listing URL to start from (defaults to source.default-listing-url)
        #[arg(long)]
        seed: Option<String>,

        /// Last listing page to visit, 0 for no limit
        #[arg(long)]
        page_limit: Option<u32>,
    },

    /// Scrape every pending link
    Scrape,

    /// Write the observation log as CSV
    Export {
        /// Output file (defaults to output.export-file)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show link-state counts
    Status,

    /// Move links that hit the attempt ceiling back to pending
    Requeue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Discover { seed, page_limit } => {
            handle_discover(&config, seed, page_limit).await
        }
        Command::Scrape => handle_scrape(&config).await,
        Command::Export { output } => handle_export(&config, output).await,
        Command::Status => handle_status(&config).await,
        Command::Requeue => handle_requeue(&config).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("obs_harvest=info,warn"),
            1 => EnvFilter::new("obs_harvest=debug,info"),
            2 => EnvFilter::new("obs_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the returned token on Ctrl+C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current item");
            trigger.cancel();
        }
    });
    token
}

fn error_log_for(config: &Config) -> Arc<ErrorLog> {
    Arc::new(ErrorLog::new(config.output.error_log_path(), Utc::now()))
}

/// Handles `discover`: grows the pending set from the listing
async fn handle_discover(
    config: &Config,
    seed: Option<String>,
    page_limit: Option<u32>,
) -> anyhow::Result<()> {
    let seed = seed.unwrap_or_else(|| config.source.default_listing_url.clone());
    let seed = Url::parse(&seed).with_context(|| format!("invalid seed URL {}", seed))?;
    let page_limit = page_limit.unwrap_or(config.discovery.default_page_limit);

    let client = build_http_client(&config.user_agent, config.scrape.request_timeout_secs)?;
    let source = HttpListingSource::new(client, config.source.link_prefix.clone());
    let store = LinkSetStore::from_config(&config.output);
    let error_log = error_log_for(config);
    let cancel = shutdown_token();

    let result = LinkDiscoverer::new(&store, &source, &error_log, &config.discovery)
        .discover(&seed, page_limit, &cancel)
        .await;
    error_log.finalize().await?;

    let report = result.context("discovery aborted by a storage failure")?;
    println!("=== Discovery Summary ===\n");
    println!("  Pages visited: {}", report.pages_visited);
    println!("  Pages skipped: {}", report.pages_skipped);
    println!("  New links:     {}", report.new_links);
    println!("  Pending links: {}", report.total_pending);
    if report.aborted {
        println!("\n✗ Stopped after too many consecutive failed pages");
    } else if report.cancelled {
        println!("\n✗ Interrupted; run discover again to continue");
    }
    Ok(())
}

/// Handles `scrape`: reconciles link state, then works through the queue
async fn handle_scrape(config: &Config) -> anyhow::Result<()> {
    let store = LinkSetStore::from_config(&config.output);
    let (queue, reconciled) = LinkStateReconciler::new(&store, config.scrape.max_attempts)
        .reconcile_with_report()
        .await?;
    for link in &reconciled.newly_exhausted {
        println!("  Parked after {} failed runs: {}", config.scrape.max_attempts, link);
    }

    if queue.is_empty() {
        println!("Nothing to scrape.");
        return Ok(());
    }

    let base_url = Url::parse(&config.source.base_url)?;
    let client = build_http_client(&config.user_agent, config.scrape.request_timeout_secs)?;
    let error_log = error_log_for(config);
    let extractor = HttpPageExtractor::new(client, base_url, error_log.clone());
    let mut observations = ObservationStore::open(config.output.observations_path()).await?;
    let cancel = shutdown_token();

    let result = ScrapeExecutor::new(&store, &mut observations, &extractor, &error_log)
        .with_delay(CourtesyDelay::new(
            config.scrape.min_delay_ms,
            config.scrape.max_delay_ms,
        ))
        .run(queue, &cancel)
        .await;
    let retained_log = error_log.finalize().await?;

    let report = result.context("scrape aborted by a storage failure")?;
    println!("=== Scrape Summary ===\n");
    println!("  Completed: {}", report.completed);
    println!("  Failed:    {}", report.failed);
    if report.duplicates > 0 {
        println!("  Already present: {}", report.duplicates);
    }
    println!("  Remaining: {}", report.remaining());
    if let Some(path) = retained_log {
        println!("\nErrors were logged to {}", path.display());
    }
    if report.cancelled {
        println!("\n✗ Interrupted; run scrape again to resume");
    }
    Ok(())
}

/// Handles `export`: writes the observation log as CSV
async fn handle_export(config: &Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let export_path = output.unwrap_or_else(|| config.output.export_path());
    let summary = export_observations(&config.output.observations_path(), &export_path).await?;

    if summary.rows == 0 {
        println!("No data to export.");
    } else {
        println!(
            "✓ Exported {} observations to: {}",
            summary.rows,
            export_path.display()
        );
    }
    if summary.skipped_lines > 0 {
        println!("  ({} malformed line(s) skipped)", summary.skipped_lines);
    }
    Ok(())
}

/// Handles `status`: prints link-state counts
async fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = LinkSetStore::from_config(&config.output);
    let stats = load_statistics(&store).await?;
    print_statistics(&stats);
    Ok(())
}

/// Handles `requeue`: moves exhausted links back to pending
async fn handle_requeue(config: &Config) -> anyhow::Result<()> {
    let store = LinkSetStore::from_config(&config.output);
    let moved = LinkStateReconciler::new(&store, config.scrape.max_attempts)
        .requeue_exhausted()
        .await?;
    println!("✓ Requeued {} exhausted link(s)", moved);
    Ok(())
}
