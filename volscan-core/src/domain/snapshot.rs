//! VolumeSnapshot, the stored output unit of a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Symbol;

/// Day-over-day volume change for one symbol at one run.
///
/// Only constructed by the snapshot builder, which guarantees both volumes
/// are strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub symbol: Symbol,
    pub last_trade_date: NaiveDate,
    pub previous_trade_date: NaiveDate,
    pub latest_volume: u64,
    pub previous_volume: u64,
    pub volume_ratio: Option<f64>,
    pub volume_change_pct: Option<f64>,
    pub is_spike: bool,
}
