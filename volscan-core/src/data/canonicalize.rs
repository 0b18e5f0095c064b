//! Raw history → canonical volume series.
//!
//! Two steps share the same coercion rules:
//! - `has_sufficient_volume` decides whether a raw response is usable at all
//!   (the retrieval strategy uses it to pick between request shapes);
//! - `canonicalize` turns a raw response into a `HistorySeries`: UTC stamps,
//!   time order, one observation per trade date.

use super::provider::RawHistory;
use crate::domain::series::MIN_OBSERVATIONS;
use crate::domain::{HistorySeries, VolumeObservation};

/// Coerce one volume cell to a number; blanks and non-finite values drop out.
fn numeric(cell: Option<f64>) -> Option<f64> {
    cell.filter(|v| v.is_finite())
}

/// Usability test for a raw provider response.
///
/// Usable means: at least one row, a volume column, and at least two numeric
/// volumes. With `require_positive` every numeric volume must also be > 0.
pub fn has_sufficient_volume(raw: &RawHistory, require_positive: bool) -> bool {
    if raw.is_empty() || raw.volume.is_none() {
        return false;
    }

    let volumes: Vec<f64> = raw.rows().filter_map(|(_, v)| numeric(v)).collect();
    if volumes.len() < MIN_OBSERVATIONS {
        return false;
    }

    !require_positive || volumes.iter().all(|&v| v > 0.0)
}

/// Build the canonical series from a raw response.
///
/// Negative volumes are treated as corrupt cells and dropped; fractional
/// volumes are truncated.
pub fn canonicalize(raw: &RawHistory) -> HistorySeries {
    let observations = raw
        .rows()
        .filter_map(|(ts, cell)| {
            let volume = numeric(cell).filter(|v| *v >= 0.0)?;
            Some(VolumeObservation::new(ts.to_utc(), volume.trunc() as u64))
        })
        .collect();

    HistorySeries::from_observations(observations)
}
