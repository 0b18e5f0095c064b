//! Snapshot persistence.

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use volscan_core::VolumeSnapshot;

use super::{authorized, build_client, send, StoreError};
use crate::config::StoreSettings;

/// Rows per upsert request.
pub const UPSERT_CHUNK_SIZE: usize = 500;

/// Identity and capture time of one run, attached to every stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    pub run_id: Uuid,
    pub captured_at_utc: DateTime<Utc>,
    /// Same instant in the display offset.
    pub captured_at_local: DateTime<FixedOffset>,
}

impl RunStamp {
    /// Fresh run id, captured now.
    pub fn new(display_offset: FixedOffset) -> Self {
        Self::at(Uuid::new_v4(), Utc::now(), display_offset)
    }

    pub fn at(run_id: Uuid, captured_at_utc: DateTime<Utc>, display_offset: FixedOffset) -> Self {
        Self {
            run_id,
            captured_at_utc,
            captured_at_local: captured_at_utc.with_timezone(&display_offset),
        }
    }
}

/// One row of the snapshot table. `(batch_id, ticker)` is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub batch_id: Uuid,
    pub ticker: String,
    pub last_trade_date: NaiveDate,
    pub previous_trade_date: NaiveDate,
    pub latest_volume: u64,
    pub previous_volume: u64,
    pub volume_ratio: Option<f64>,
    pub volume_change_pct: Option<f64>,
    pub is_spike: bool,
    pub fetched_at_utc: String,
    pub fetched_at_kst: String,
}

impl SnapshotRow {
    pub fn new(stamp: &RunStamp, snapshot: &VolumeSnapshot) -> Self {
        Self {
            batch_id: stamp.run_id,
            ticker: snapshot.symbol.to_string(),
            last_trade_date: snapshot.last_trade_date,
            previous_trade_date: snapshot.previous_trade_date,
            latest_volume: snapshot.latest_volume,
            previous_volume: snapshot.previous_volume,
            volume_ratio: snapshot.volume_ratio,
            volume_change_pct: snapshot.volume_change_pct,
            is_spike: snapshot.is_spike,
            fetched_at_utc: stamp.captured_at_utc.to_rfc3339(),
            fetched_at_kst: stamp.captured_at_local.to_rfc3339(),
        }
    }
}

/// Destination for a run's snapshots.
pub trait SnapshotSink: Send + Sync {
    fn store(&self, stamp: &RunStamp, snapshots: &[VolumeSnapshot]) -> Result<(), StoreError>;
}

/// Upserts rows into the hosted table over REST.
pub struct RestSink {
    client: Client,
    endpoint: String,
    key: String,
}

impl RestSink {
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            endpoint: settings.rest_endpoint(&settings.table),
            key: settings.service_role_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Rows grouped into upsert requests.
    pub fn payloads(stamp: &RunStamp, snapshots: &[VolumeSnapshot]) -> Vec<Vec<SnapshotRow>> {
        snapshots
            .chunks(UPSERT_CHUNK_SIZE)
            .map(|chunk| chunk.iter().map(|s| SnapshotRow::new(stamp, s)).collect())
            .collect()
    }

    fn post(&self, rows: &[SnapshotRow]) -> Result<(), StoreError> {
        let request = authorized(self.client.post(&self.endpoint), &self.key)
            .query(&[("on_conflict", "batch_id,ticker")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        send(request).map(|_| ())
    }
}

impl SnapshotSink for RestSink {
    fn store(&self, stamp: &RunStamp, snapshots: &[VolumeSnapshot]) -> Result<(), StoreError> {
        if snapshots.is_empty() {
            warn!("no snapshots to upload");
            return Ok(());
        }

        let payloads = Self::payloads(stamp, snapshots);
        let total = payloads.len();
        for (idx, rows) in payloads.iter().enumerate() {
            if let Err(e) = self.post(rows) {
                error!(chunk = idx + 1, total, error = %e, "snapshot upload failed");
                return Err(e);
            }
            info!(chunk = idx + 1, total, rows = rows.len(), "uploaded chunk");
        }
        Ok(())
    }
}

/// Keeps stored runs in memory. Used for previews and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Mutex<Vec<(RunStamp, Vec<VolumeSnapshot>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<(RunStamp, Vec<VolumeSnapshot>)> {
        match self.runs.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SnapshotSink for MemorySink {
    fn store(&self, stamp: &RunStamp, snapshots: &[VolumeSnapshot]) -> Result<(), StoreError> {
        let entry = (*stamp, snapshots.to_vec());
        match self.runs.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }
}
