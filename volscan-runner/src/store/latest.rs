//! Paginated reader for the latest snapshot per ticker.

use chrono::{DateTime, FixedOffset, NaiveDate};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{authorized, build_client, send, StoreError};
use crate::config::StoreSettings;

const SELECT_COLUMNS: &str = "id,ticker,last_trade_date,previous_trade_date,latest_volume,\
previous_volume,volume_ratio,volume_change_pct,is_spike,fetched_at_utc,fetched_at_kst,created_at";

const ORDER: &str = "volume_change_pct.desc.nullslast";

/// A 1-based page request, already clamped to valid bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamp the page to at least 1 and the size to `1..=max_size`.
    /// A missing size falls back to `default_size`.
    pub fn clamped(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        let max_size = max_size.max(1);
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_size),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Value for the `Range` header: `items={first}-{last}`, both inclusive.
    pub fn range_header(&self) -> String {
        let first = self.offset();
        let last = first + u64::from(self.page_size).saturating_sub(1);
        format!("items={first}-{last}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

/// One row of the latest view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestRow {
    pub id: i64,
    pub ticker: String,
    pub last_trade_date: NaiveDate,
    pub previous_trade_date: NaiveDate,
    pub latest_volume: u64,
    pub previous_volume: u64,
    pub volume_ratio: Option<f64>,
    pub volume_change_pct: Option<f64>,
    pub is_spike: bool,
    pub fetched_at_utc: DateTime<FixedOffset>,
    pub fetched_at_kst: DateTime<FixedOffset>,
    pub created_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestPage {
    pub items: Vec<LatestRow>,
    #[serde(flatten)]
    pub meta: PageMeta,
}

/// Total row count from a `Content-Range` header such as `0-99/1234`.
///
/// Missing, unknown (`*`) or malformed totals read as 0.
pub fn parse_content_range_total(header: Option<&str>) -> u64 {
    header
        .and_then(|h| h.rsplit_once('/'))
        .and_then(|(_, total)| total.trim().parse().ok())
        .unwrap_or(0)
}

/// Page metadata. The reported total is raised to cover the rows actually
/// returned so `has_next` stays consistent with a stale or missing count.
pub fn page_meta(request: PageRequest, reported_total: u64, returned: usize) -> PageMeta {
    let seen = request.offset() + returned as u64;
    let total = reported_total.max(seen);
    PageMeta {
        total,
        page: request.page,
        page_size: request.page_size,
        has_next: seen < total,
        has_previous: request.page > 1,
    }
}

/// Reads the latest-per-ticker view, largest volume change first.
pub struct LatestClient {
    client: Client,
    endpoint: String,
    key: String,
    default_page_size: u32,
    max_page_size: u32,
}

impl LatestClient {
    pub fn new(settings: &StoreSettings) -> Result<Self, StoreError> {
        Ok(Self {
            client: build_client(settings.request_timeout)?,
            endpoint: settings.rest_endpoint(&settings.latest_view),
            key: settings.service_role_key.clone(),
            default_page_size: settings.page_size_default,
            max_page_size: settings.page_size_max,
        })
    }

    /// Build a clamped request from user input using the configured sizes.
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        PageRequest::clamped(page, page_size, self.default_page_size, self.max_page_size)
    }

    pub fn query_params() -> [(&'static str, &'static str); 2] {
        [("select", SELECT_COLUMNS), ("order", ORDER)]
    }

    pub fn fetch_page(&self, request: PageRequest) -> Result<LatestPage, StoreError> {
        debug!(page = request.page, page_size = request.page_size, "fetching latest snapshots");

        let http = authorized(self.client.get(&self.endpoint), &self.key)
            .query(&Self::query_params())
            .header("Accept", "application/json")
            .header("Prefer", "count=exact")
            .header("Range", request.range_header());

        let response = send(http).map_err(|e| {
            error!(error = %e, "latest snapshot request failed");
            e
        })?;

        let total = parse_content_range_total(
            response
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
        );
        let items: Vec<LatestRow> = response
            .json()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let meta = page_meta(request, total, items.len());
        Ok(LatestPage { items, meta })
    }
}
