//! Batch orchestration with batch-level rate-limit backoff.
//!
//! The symbol list is cut into contiguous batches. Each batch runs every
//! symbol through retrieval, canonicalization and the snapshot builder. If
//! any symbol reports a rate limit, the whole batch attempt is thrown away,
//! the next wait on the backoff ladder is slept, and the same batch is tried
//! again. A completed batch resets the ladder, keeps its results, and is
//! followed by a short politeness pause. When the ladder runs out the run
//! stops and returns what earlier batches produced.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use volscan_core::data::{canonicalize, MarketDataClient};
use volscan_core::retrieval::{HistoryRetriever, RateLimitClassifier, RateLimited, RetrievalConfig};
use volscan_core::{build_snapshot, SkipReason, Symbol, SymbolOutcome, VolumeSnapshot};

use crate::pacing::{BackoffLadder, Sleeper, ThreadSleeper};
use crate::progress::{BatchProgress, LogProgress};

/// Batching and pacing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Symbols per batch. Zero is treated as one.
    pub chunk_size: usize,
    /// Pause after a completed batch when more remain. Zero disables it.
    pub inter_batch_pause: Duration,
    /// Waits used for consecutive rate-limited attempts.
    pub backoff_ladder: Vec<Duration>,
    /// Fetch the symbols of a batch on the rayon pool.
    pub parallel_within_batch: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            inter_batch_pause: Duration::from_secs(1),
            backoff_ladder: BackoffLadder::default().steps().to_vec(),
            parallel_within_batch: false,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunCompletion {
    /// Every batch completed.
    Completed,
    /// A batch stayed rate limited through the whole ladder; `batch` is its
    /// zero-based index and no later batch was attempted.
    LadderExhausted { batch: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: Symbol,
    pub reason: SkipReason,
}

/// Accumulated result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Snapshots from completed batches, in input order.
    pub snapshots: Vec<VolumeSnapshot>,
    /// Symbols from completed batches that produced no snapshot.
    pub skipped: Vec<SkippedSymbol>,
    pub total_symbols: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    /// Backoff waits actually slept, in order.
    pub backoff_waits: Vec<Duration>,
    pub completion: RunCompletion,
}

impl RunReport {
    fn new(total_symbols: usize, batches_total: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            skipped: Vec::new(),
            total_symbols,
            batches_total,
            batches_completed: 0,
            backoff_waits: Vec::new(),
            completion: RunCompletion::Completed,
        }
    }

    /// True when the run stopped before reaching the end of the list.
    pub fn is_partial(&self) -> bool {
        matches!(self.completion, RunCompletion::LadderExhausted { .. })
    }

    /// Symbols that were never processed by a completed batch.
    pub fn unprocessed_symbols(&self) -> usize {
        self.total_symbols
            .saturating_sub(self.snapshots.len() + self.skipped.len())
    }

    fn absorb(&mut self, outcomes: Vec<SymbolOutcome>) -> (usize, usize) {
        let (mut kept, mut skipped) = (0, 0);
        for outcome in outcomes {
            match outcome {
                SymbolOutcome::Snapshot(snapshot) => {
                    self.snapshots.push(snapshot);
                    kept += 1;
                }
                SymbolOutcome::Skipped { symbol, reason } => {
                    self.skipped.push(SkippedSymbol { symbol, reason });
                    skipped += 1;
                }
            }
        }
        self.batches_completed += 1;
        (kept, skipped)
    }
}

/// Drives a symbol list through retrieval and snapshot building.
pub struct BatchOrchestrator<'a> {
    client: &'a dyn MarketDataClient,
    retrieval: RetrievalConfig,
    classifier: RateLimitClassifier,
    config: OrchestratorConfig,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn BatchProgress,
    as_of: Option<DateTime<Utc>>,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        client: &'a dyn MarketDataClient,
        retrieval: RetrievalConfig,
        classifier: RateLimitClassifier,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            client,
            retrieval,
            classifier,
            config,
            sleeper: &ThreadSleeper,
            progress: &LogProgress,
            as_of: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn BatchProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Pin the reference time used for date-range requests.
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn run(&self, symbols: &[Symbol]) -> RunReport {
        let batches: Vec<&[Symbol]> = symbols.chunks(self.config.chunk_size.max(1)).collect();
        let total_batches = batches.len();
        let mut report = RunReport::new(symbols.len(), total_batches);
        let mut ladder = BackoffLadder::new(self.config.backoff_ladder.clone());

        info!(
            symbols = symbols.len(),
            batches = total_batches,
            client = self.client.name(),
            "starting volume fetch"
        );

        let mut cursor = 0;
        let mut attempt = 1;
        while let Some(batch) = batches.get(cursor) {
            self.progress
                .on_batch_start(cursor, total_batches, attempt, batch.len());

            match self.process_batch(batch) {
                Ok(outcomes) => {
                    ladder.reset();
                    let (kept, skipped) = report.absorb(outcomes);
                    self.progress
                        .on_batch_complete(cursor, total_batches, kept, skipped);

                    cursor += 1;
                    attempt = 1;
                    if cursor < total_batches && !self.config.inter_batch_pause.is_zero() {
                        self.sleeper.sleep(self.config.inter_batch_pause);
                    }
                }
                Err(err) => match ladder.next_wait() {
                    Some(wait) => {
                        self.progress.on_rate_limited(cursor, &err, Some(wait));
                        self.sleeper.sleep(wait);
                        report.backoff_waits.push(wait);
                        attempt += 1;
                    }
                    None => {
                        self.progress.on_rate_limited(cursor, &err, None);
                        report.completion = RunCompletion::LadderExhausted { batch: cursor };
                        break;
                    }
                },
            }
        }

        self.progress.on_run_complete(&report);
        report
    }

    /// One attempt at a batch. Outcomes are in input order.
    fn process_batch(&self, batch: &[Symbol]) -> Result<Vec<SymbolOutcome>, RateLimited> {
        let as_of = self.as_of.unwrap_or_else(Utc::now);

        let outcomes: Vec<SymbolOutcome> = if self.config.parallel_within_batch {
            batch
                .par_iter()
                .map(|symbol| self.process_symbol(symbol, as_of))
                .collect::<Result<_, _>>()?
        } else {
            batch
                .iter()
                .map(|symbol| self.process_symbol(symbol, as_of))
                .collect::<Result<_, _>>()?
        };

        for outcome in &outcomes {
            self.progress.on_symbol(outcome);
        }
        Ok(outcomes)
    }

    fn process_symbol(&self, symbol: &Symbol, as_of: DateTime<Utc>) -> Result<SymbolOutcome, RateLimited> {
        let retriever = HistoryRetriever::new(self.client, &self.retrieval, &self.classifier);
        let fetched = retriever.fetch(symbol, as_of)?;
        let last_error = fetched.last_error().map(str::to_string);

        let result = match fetched.best {
            Some(found) if !found.history.is_empty() => {
                build_snapshot(symbol, &canonicalize(&found.history))
            }
            _ => Err(SkipReason::NoHistory { last_error }),
        };
        Ok(SymbolOutcome::from_result(symbol, result))
    }
}
