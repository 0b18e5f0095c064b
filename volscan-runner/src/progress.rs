//! Progress callbacks for batch runs.

use std::time::Duration;

use tracing::{debug, info, warn};
use volscan_core::retrieval::RateLimited;
use volscan_core::SymbolOutcome;

use crate::orchestrator::RunReport;

/// Observer for orchestrator milestones. Batch indices are zero-based.
pub trait BatchProgress: Send + Sync {
    /// Called before each attempt of a batch, including retries.
    fn on_batch_start(&self, batch: usize, total_batches: usize, attempt: u32, symbols: usize);

    /// Called for every symbol of a batch attempt that was not rate limited.
    fn on_symbol(&self, outcome: &SymbolOutcome);

    /// Called when a batch attempt is discarded. `wait` is `None` when the
    /// backoff ladder is exhausted and the run is about to stop.
    fn on_rate_limited(&self, batch: usize, error: &RateLimited, wait: Option<Duration>);

    /// Called after a batch completes and its results are kept.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, snapshots: usize, skipped: usize);

    fn on_run_complete(&self, report: &RunReport);
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_batch_start(&self, batch: usize, total_batches: usize, attempt: u32, symbols: usize) {
        if attempt > 1 {
            info!(batch = batch + 1, total_batches, attempt, symbols, "retrying batch");
        } else {
            debug!(batch = batch + 1, total_batches, symbols, "starting batch");
        }
    }

    fn on_symbol(&self, outcome: &SymbolOutcome) {
        if let SymbolOutcome::Skipped { symbol, reason } = outcome {
            debug!(%symbol, %reason, "skipping symbol");
        }
    }

    fn on_rate_limited(&self, batch: usize, error: &RateLimited, wait: Option<Duration>) {
        match wait {
            Some(wait) => warn!(
                batch = batch + 1,
                wait_secs = wait.as_secs(),
                error = %error,
                "rate limited; backing off before retrying batch"
            ),
            None => warn!(
                batch = batch + 1,
                error = %error,
                "rate limited and backoff ladder exhausted; stopping early"
            ),
        }
    }

    fn on_batch_complete(&self, batch: usize, total_batches: usize, snapshots: usize, skipped: usize) {
        info!(batch = batch + 1, total_batches, snapshots, skipped, "batch complete");
    }

    fn on_run_complete(&self, report: &RunReport) {
        info!(
            snapshots = report.snapshots.len(),
            skipped = report.skipped.len(),
            symbols = report.total_symbols,
            batches = report.batches_completed,
            completion = ?report.completion,
            "generated snapshots"
        );
    }
}

/// Discards all progress events.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl BatchProgress for SilentProgress {
    fn on_batch_start(&self, _: usize, _: usize, _: u32, _: usize) {}
    fn on_symbol(&self, _: &SymbolOutcome) {}
    fn on_rate_limited(&self, _: usize, _: &RateLimited, _: Option<Duration>) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: usize) {}
    fn on_run_complete(&self, _: &RunReport) {}
}
