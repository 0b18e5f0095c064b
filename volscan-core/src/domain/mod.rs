//! Domain types for volscan

pub mod series;
pub mod snapshot;
pub mod symbol;

pub use series::{HistorySeries, VolumeObservation};
pub use snapshot::VolumeSnapshot;
pub use symbol::Symbol;
