//! One complete run: pick symbols, fetch snapshots, then preview or store.

use chrono::FixedOffset;
use thiserror::Error;
use tracing::{info, warn};
use volscan_core::data::{load_tickers, TickerSourceError};
use volscan_core::Symbol;

use crate::config::{default_display_offset, FetchSettings};
use crate::orchestrator::{BatchOrchestrator, RunReport};
use crate::store::{RunStamp, SnapshotSink, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tickers(#[from] TickerSourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialize preview: {0}")]
    Preview(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Process only the first N symbols.
    pub limit: Option<usize>,
    /// Fetch and preview without storing.
    pub dry_run: bool,
    pub preview_count: usize,
    pub display_offset: FixedOffset,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            dry_run: false,
            preview_count: 5,
            display_offset: default_display_offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Nothing to store; the sink was not called.
    Empty { report: RunReport },
    /// Dry run. `preview` holds the first snapshots as JSON lines.
    Previewed {
        report: RunReport,
        stamp: RunStamp,
        preview: Vec<String>,
    },
    Stored { report: RunReport, stamp: RunStamp },
}

impl PipelineOutcome {
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Empty { report } | Self::Previewed { report, .. } | Self::Stored { report, .. } => report,
        }
    }
}

/// Load the ticker list and apply the optional limit.
pub fn load_symbols(settings: &FetchSettings, limit: Option<usize>) -> Result<Vec<Symbol>, PipelineError> {
    let mut symbols = load_tickers(&settings.tickers_file)?;
    info!(count = symbols.len(), path = %settings.tickers_file.display(), "loaded tickers");

    if let Some(limit) = limit {
        symbols.truncate(limit);
        info!(count = symbols.len(), "limiting run");
    }
    Ok(symbols)
}

/// Run the orchestrator over `symbols` and hand the result to `sink`.
///
/// A partial run (backoff ladder exhausted) is still stored; it is reported
/// with a warning, not an error.
pub fn run_pipeline(
    symbols: &[Symbol],
    orchestrator: &BatchOrchestrator<'_>,
    sink: &dyn SnapshotSink,
    options: &RunOptions,
) -> Result<PipelineOutcome, PipelineError> {
    let symbols = match options.limit {
        Some(limit) if limit < symbols.len() => &symbols[..limit],
        _ => symbols,
    };

    info!(symbols = symbols.len(), "starting volume snapshot run");
    let report = orchestrator.run(symbols);

    if report.is_partial() {
        warn!(
            produced = report.snapshots.len() + report.skipped.len(),
            expected = report.total_symbols,
            "run stopped early after repeated rate limiting; results are partial"
        );
    }

    if report.snapshots.is_empty() {
        warn!("no snapshots produced; aborting");
        return Ok(PipelineOutcome::Empty { report });
    }

    let stamp = RunStamp::new(options.display_offset);
    info!(snapshots = report.snapshots.len(), batch_id = %stamp.run_id, "prepared snapshots");

    if options.dry_run {
        let preview = report
            .snapshots
            .iter()
            .take(options.preview_count)
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        info!("dry run enabled; skipping upload");
        for line in &preview {
            info!("{line}");
        }
        return Ok(PipelineOutcome::Previewed {
            report,
            stamp,
            preview,
        });
    }

    sink.store(&stamp, &report.snapshots)?;
    info!(batch_id = %stamp.run_id, "upload complete");
    Ok(PipelineOutcome::Stored { report, stamp })
}
