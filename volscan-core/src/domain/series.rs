//! Volume observations and per-symbol history series.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of observations a series needs to produce a snapshot.
pub const MIN_OBSERVATIONS: usize = 2;

/// One (trade time, volume) point for a symbol. Timestamps are always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeObservation {
    pub timestamp: DateTime<Utc>,
    pub volume: u64,
}

impl VolumeObservation {
    pub fn new(timestamp: DateTime<Utc>, volume: u64) -> Self {
        Self { timestamp, volume }
    }

    /// Trade date of the observation (UTC calendar date).
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Time-ordered volume history for one symbol.
///
/// Invariant: strictly increasing by trade date, one observation per date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySeries {
    observations: Vec<VolumeObservation>,
}

impl HistorySeries {
    /// Build a series from observations in any order.
    ///
    /// Sorts by timestamp and collapses observations sharing a trade date;
    /// the latest observation of a date wins.
    pub fn from_observations(mut observations: Vec<VolumeObservation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);

        let mut deduped: Vec<VolumeObservation> = Vec::with_capacity(observations.len());
        for obs in observations {
            match deduped.last_mut() {
                Some(last) if last.trade_date() == obs.trade_date() => *last = obs,
                _ => deduped.push(obs),
            }
        }

        Self {
            observations: deduped,
        }
    }

    pub fn observations(&self) -> &[VolumeObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// True when the series holds enough observations for a snapshot.
    pub fn is_usable(&self) -> bool {
        self.observations.len() >= MIN_OBSERVATIONS
    }

    /// The two most recent observations as `(previous, latest)`.
    pub fn latest_pair(&self) -> Option<(&VolumeObservation, &VolumeObservation)> {
        match self.observations.as_slice() {
            [.., previous, latest] => Some((previous, latest)),
            _ => None,
        }
    }
}
