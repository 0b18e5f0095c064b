//! volscan runner: batch orchestration, pacing, configuration, persistence.
//!
//! This crate builds on `volscan-core` to provide:
//! - Layered run configuration (defaults, TOML file, environment)
//! - The batch orchestrator with a rate-limit backoff ladder
//! - Sleep and progress seams so runs can be driven without waiting
//! - Snapshot upload and the paginated latest-results reader
//! - The end-to-end pipeline used by the CLI

pub mod config;
pub mod orchestrator;
pub mod pacing;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use config::{ConfigError, FetchSettings, StoreSettings};
pub use orchestrator::{BatchOrchestrator, OrchestratorConfig, RunCompletion, RunReport, SkippedSymbol};
pub use pacing::{BackoffLadder, RecordingSleeper, Sleeper, ThreadSleeper};
pub use pipeline::{load_symbols, run_pipeline, PipelineError, PipelineOutcome, RunOptions};
pub use progress::{BatchProgress, LogProgress, SilentProgress};
pub use store::{
    LatestClient, LatestPage, MemorySink, PageMeta, PageRequest, RestSink, RunStamp, SnapshotSink, StoreError,
};
