//! volscan core: symbols, upstream history retrieval, and volume snapshots.
//!
//! This crate holds everything needed to turn one ticker into one
//! day-over-day volume snapshot:
//! - Domain types (symbols, volume observations, history series, snapshots)
//! - Ticker list loading with normalization and de-duplication
//! - The upstream market-data client trait, a Yahoo Finance client, and a
//!   scripted in-memory client
//! - History canonicalization (volume coercion, UTC timestamps, date dedup)
//! - Rate-limit classification of upstream failures
//! - Multi-shape history retrieval with per-shape retry
//! - The snapshot builder and typed skip outcomes
//!
//! Batching, backoff, and persistence live in `volscan-runner`.

pub mod data;
pub mod domain;
pub mod retrieval;
pub mod snapshot;

pub use domain::{HistorySeries, Symbol, VolumeObservation, VolumeSnapshot};
pub use snapshot::{build_snapshot, SkipReason, SymbolOutcome, SPIKE_RATIO};
