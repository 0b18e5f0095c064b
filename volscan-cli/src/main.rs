//! volscan CLI: fetch day-over-day volume snapshots and read the latest ones.
//!
//! Commands:
//! - `fetch`: run the batch fetch over the ticker list and upload snapshots
//! - `latest`: page through the latest snapshot per ticker, biggest movers first

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use volscan_core::data::YahooClient;
use volscan_runner::config::default_display_offset;
use volscan_runner::{
    load_symbols, run_pipeline, BatchOrchestrator, FetchSettings, LatestClient, LatestPage, MemorySink,
    PipelineOutcome, RestSink, RunOptions, SnapshotSink, StoreSettings,
};

#[derive(Parser)]
#[command(name = "volscan", about = "Daily volume change sampler for US tickers")]
struct Cli {
    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch volumes for every ticker and store one snapshot per ticker.
    Fetch {
        /// Override the tickers CSV file.
        #[arg(long)]
        tickers_file: Option<PathBuf>,

        /// Process only the first N tickers (for testing).
        #[arg(long)]
        limit: Option<usize>,

        /// Fetch data but do not upload; log a preview instead.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Optional TOML file with fetch settings. Environment variables win.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the latest snapshot per ticker, sorted by volume change.
    Latest {
        /// Page number, starting at 1.
        #[arg(long)]
        page: Option<u32>,

        /// Rows per page (capped by PAGE_SIZE_MAX).
        #[arg(long)]
        page_size: Option<u32>,

        /// Print the page as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Fetch {
            tickers_file,
            limit,
            dry_run,
            config,
        } => run_fetch(tickers_file, limit, dry_run, config),
        Commands::Latest {
            page,
            page_size,
            json,
        } => run_latest(page, page_size, json),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn run_fetch(
    tickers_file: Option<PathBuf>,
    limit: Option<usize>,
    dry_run: bool,
    config: Option<PathBuf>,
) -> Result<()> {
    let mut settings = FetchSettings::load(config.as_deref())?;
    if let Some(path) = tickers_file {
        settings.tickers_file = path;
    }

    // store settings load before fetching; dry runs never touch the store
    let (sink, display_offset): (Box<dyn SnapshotSink>, FixedOffset) = if dry_run {
        (Box::new(MemorySink::new()), default_display_offset())
    } else {
        let store = StoreSettings::from_env()?;
        (Box::new(RestSink::new(&store)?), store.display_offset)
    };

    let symbols = load_symbols(&settings, limit)?;
    let client = YahooClient::new(settings.request_timeout())?;
    let orchestrator = BatchOrchestrator::new(
        &client,
        settings.retrieval_config(),
        settings.classifier(),
        settings.orchestrator_config(),
    );

    let options = RunOptions {
        dry_run,
        display_offset,
        ..RunOptions::default()
    };
    let outcome = run_pipeline(&symbols, &orchestrator, sink.as_ref(), &options)?;

    let report = outcome.report();
    match &outcome {
        PipelineOutcome::Empty { .. } => println!("No snapshots produced."),
        PipelineOutcome::Previewed { stamp, .. } => println!(
            "Dry run: {} snapshots prepared (batch_id={}), nothing uploaded.",
            report.snapshots.len(),
            stamp.run_id
        ),
        PipelineOutcome::Stored { stamp, .. } => println!(
            "Stored {} snapshots (batch_id={}).",
            report.snapshots.len(),
            stamp.run_id
        ),
    }
    if report.is_partial() {
        warn!(
            unprocessed = report.unprocessed_symbols(),
            "run ended early; rerun later to cover the remaining tickers"
        );
    }
    info!(skipped = report.skipped.len(), "fetch finished");
    Ok(())
}

fn run_latest(page: Option<u32>, page_size: Option<u32>, json: bool) -> Result<()> {
    let store = StoreSettings::from_env()?;
    let client = LatestClient::new(&store)?;
    let request = client.page_request(page, page_size);
    let result = client.fetch_page(request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_page(&result, store.display_offset);
    }
    Ok(())
}

fn print_page(page: &LatestPage, offset: FixedOffset) {
    if page.items.is_empty() {
        println!("No snapshots found.");
        return;
    }

    println!(
        "{:<8} {:<12} {:>14} {:>14} {:>10} {:<5} {:<16}",
        "Ticker", "Trade date", "Latest vol", "Previous vol", "Change %", "Spike", "Fetched"
    );
    println!("{}", "-".repeat(86));
    for row in &page.items {
        let change = row
            .volume_change_pct
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<8} {:<12} {:>14} {:>14} {:>10} {:<5} {:<16}",
            row.ticker,
            row.last_trade_date.to_string(),
            row.latest_volume,
            row.previous_volume,
            change,
            if row.is_spike { "yes" } else { "" },
            row.fetched_at_utc.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string(),
        );
    }

    let meta = &page.meta;
    println!();
    println!(
        "Page {} ({} per page), {} total{}{}",
        meta.page,
        meta.page_size,
        meta.total,
        if meta.has_previous { ", has previous" } else { "" },
        if meta.has_next { ", has next" } else { "" },
    );
}
