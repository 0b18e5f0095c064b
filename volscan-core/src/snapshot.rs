//! Snapshot builder: canonical series to day-over-day volume change.
//!
//! Takes the two most recent observations of a canonical series and derives
//! the ratio, percent change, and spike flag. Symbols that cannot produce a
//! trustworthy snapshot come back as a typed `SkipReason` rather than a
//! snapshot with zero or missing volumes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{HistorySeries, Symbol, VolumeSnapshot};

/// Ratio at or above which the latest volume counts as a spike.
pub const SPIKE_RATIO: f64 = 2.0;

/// Why a symbol produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Retrieval returned nothing at all.
    NoHistory { last_error: Option<String> },
    /// Fewer than two usable observations after canonicalization.
    TooFewObservations { count: usize },
    /// One of the two compared volumes was zero.
    NonPositiveVolume { latest: u64, previous: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHistory { last_error: Some(e) } => write!(f, "no history returned (last error: {e})"),
            Self::NoHistory { last_error: None } => write!(f, "no history returned"),
            Self::TooFewObservations { count } => {
                write!(f, "only {count} usable observation(s), need 2")
            }
            Self::NonPositiveVolume { latest, previous } => {
                write!(f, "non-positive volume (latest {latest}, previous {previous})")
            }
        }
    }
}

/// Per-symbol result of a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Snapshot(VolumeSnapshot),
    Skipped { symbol: Symbol, reason: SkipReason },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Snapshot(s) => &s.symbol,
            Self::Skipped { symbol, .. } => symbol,
        }
    }

    pub fn snapshot(&self) -> Option<&VolumeSnapshot> {
        match self {
            Self::Snapshot(s) => Some(s),
            Self::Skipped { .. } => None,
        }
    }

    pub fn from_result(symbol: &Symbol, result: Result<VolumeSnapshot, SkipReason>) -> Self {
        match result {
            Ok(snapshot) => Self::Snapshot(snapshot),
            Err(reason) => Self::Skipped {
                symbol: symbol.clone(),
                reason,
            },
        }
    }
}

/// Build a snapshot from the two most recent observations.
pub fn build_snapshot(symbol: &Symbol, series: &HistorySeries) -> Result<VolumeSnapshot, SkipReason> {
    let (previous, latest) = series
        .latest_pair()
        .ok_or(SkipReason::TooFewObservations { count: series.len() })?;

    if previous.volume == 0 || latest.volume == 0 {
        return Err(SkipReason::NonPositiveVolume {
            latest: latest.volume,
            previous: previous.volume,
        });
    }

    let (latest_f, previous_f) = (latest.volume as f64, previous.volume as f64);
    let ratio = latest_f / previous_f;
    let change_pct = (latest_f - previous_f) / previous_f * 100.0;

    Ok(VolumeSnapshot {
        symbol: symbol.clone(),
        last_trade_date: latest.trade_date(),
        previous_trade_date: previous.trade_date(),
        latest_volume: latest.volume,
        previous_volume: previous.volume,
        volume_ratio: ratio.is_finite().then_some(ratio),
        volume_change_pct: change_pct.is_finite().then_some(change_pct),
        is_spike: ratio >= SPIKE_RATIO,
    })
}
