//! Property tests for snapshot and ticker invariants.
//!
//! Uses proptest to verify:
//! 1. Short series never produce a snapshot
//! 2. A zero volume on either side never produces a snapshot
//! 3. Derived fields are pure functions of the two volumes
//! 4. Ticker normalization is idempotent and duplicate-free

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use volscan_core::data::normalize_tickers;
use volscan_core::{build_snapshot, HistorySeries, SkipReason, Symbol, VolumeObservation, SPIKE_RATIO};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_volume() -> impl Strategy<Value = u64> {
    1u64..5_000_000_000
}

fn arb_ticker() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z]{1,5}",
        " {0,2}[a-zA-Z]{1,4} {0,2}",
        Just(String::new()),
        Just("   ".to_string()),
    ]
}

fn series_of(volumes: &[u64]) -> HistorySeries {
    let observations = volumes
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let ts = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap() + chrono::Duration::days(i as i64);
            VolumeObservation::new(ts, v)
        })
        .collect();
    HistorySeries::from_observations(observations)
}

fn sym() -> Symbol {
    Symbol::parse("SPY").unwrap()
}

// ── 1. Short series ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn fewer_than_two_observations_never_snapshot(volumes in prop::collection::vec(arb_volume(), 0..2)) {
        let result = build_snapshot(&sym(), &series_of(&volumes));
        let is_too_few = matches!(result, Err(SkipReason::TooFewObservations { .. }));
        prop_assert!(is_too_few);
    }
}

// ── 2. Non-positive pairs ────────────────────────────────────────────

proptest! {
    #[test]
    fn zero_on_either_side_never_snapshot(v in arb_volume(), zero_latest in any::<bool>()) {
        let pair = if zero_latest { [v, 0] } else { [0, v] };
        let result = build_snapshot(&sym(), &series_of(&pair));
        let is_non_positive = matches!(result, Err(SkipReason::NonPositiveVolume { .. }));
        prop_assert!(is_non_positive);
    }
}

// ── 3. Derived fields ────────────────────────────────────────────────

proptest! {
    #[test]
    fn derived_fields_follow_the_volumes(prev in arb_volume(), latest in arb_volume()) {
        let snap = build_snapshot(&sym(), &series_of(&[prev, latest])).unwrap();
        let ratio = latest as f64 / prev as f64;
        prop_assert_eq!(snap.volume_ratio, Some(ratio));
        let pct = snap.volume_change_pct.unwrap();
        prop_assert_eq!(pct, (latest as f64 - prev as f64) / prev as f64 * 100.0);
        prop_assert_eq!(snap.is_spike, ratio >= SPIKE_RATIO);
    }

    #[test]
    fn rebuilding_is_deterministic(volumes in prop::collection::vec(arb_volume(), 2..10)) {
        let series = series_of(&volumes);
        prop_assert_eq!(build_snapshot(&sym(), &series), build_snapshot(&sym(), &series));
    }
}

// ── 4. Ticker normalization ──────────────────────────────────────────

proptest! {
    #[test]
    fn normalized_tickers_are_unique_and_stable(raw in prop::collection::vec(arb_ticker(), 0..30)) {
        let once = normalize_tickers(&raw);
        let unique: HashSet<&Symbol> = once.iter().collect();
        prop_assert_eq!(unique.len(), once.len());
        for s in &once {
            prop_assert!(!s.as_str().is_empty());
            prop_assert_eq!(s.as_str(), s.as_str().trim().to_uppercase());
        }
        let twice = normalize_tickers(once.iter().map(|s| s.as_str()));
        prop_assert_eq!(once, twice);
    }
}
