//! Upstream market-data client trait and structured error types.
//!
//! The MarketDataClient trait abstracts over history sources (Yahoo Finance,
//! scripted in-memory data) so the retrieval strategy can be driven against a
//! live provider or a deterministic stub.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::Symbol;

/// One history request shape sent to the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryRequest {
    /// Provider-relative lookback such as `1d` or `5d`.
    Period { period: String, interval: String },
    /// Explicit calendar window; `end` is exclusive on the provider side.
    Range {
        start: NaiveDate,
        end: NaiveDate,
        interval: String,
    },
}

impl fmt::Display for HistoryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period { period, interval } => write!(f, "period={period} interval={interval}"),
            Self::Range {
                start,
                end,
                interval,
            } => write!(f, "start={start} end={end} interval={interval}"),
        }
    }
}

/// Timestamp exactly as the provider reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp {
    /// No zone attached; interpreted as UTC.
    Naive(NaiveDateTime),
    /// Zone-aware; converted to UTC.
    Zoned(DateTime<FixedOffset>),
}

impl RawTimestamp {
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            Self::Naive(naive) => Utc.from_utc_datetime(&naive),
            Self::Zoned(zoned) => zoned.with_timezone(&Utc),
        }
    }
}

/// Raw tabular history returned by the provider, before any validation.
///
/// `volume` is `None` when the response carried no volume column at all;
/// individual cells are `None` when the provider left them blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHistory {
    pub index: Vec<RawTimestamp>,
    pub volume: Option<Vec<Option<f64>>>,
}

impl RawHistory {
    /// History with no rows (the provider's "nothing found" answer).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(index: Vec<RawTimestamp>, volume: Option<Vec<Option<f64>>>) -> Self {
        Self { index, volume }
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// Rows paired with their volume cell; rows past the end of a short
    /// volume column read as blank.
    pub fn rows(&self) -> impl Iterator<Item = (RawTimestamp, Option<f64>)> + '_ {
        self.index.iter().enumerate().map(move |(i, ts)| {
            let cell = self
                .volume
                .as_ref()
                .and_then(|col| col.get(i).copied().flatten());
            (*ts, cell)
        })
    }
}

/// Structured error types for upstream requests.
///
/// The message text stays inspectable: rate-limit classification matches
/// against the rendered error.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("HTTP {status} {message}")]
    Http { status: u16, message: String },

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// HTTP status code, when the failure came with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for upstream history providers.
///
/// Implementations only fetch; they never retry, classify, or validate.
/// Those concerns sit in the retrieval strategy above this trait.
pub trait MarketDataClient: Send + Sync {
    /// Human-readable name of this client.
    fn name(&self) -> &str;

    /// Fetch raw volume history for one symbol using one request shape.
    fn history(&self, symbol: &Symbol, request: &HistoryRequest)
        -> Result<RawHistory, UpstreamError>;
}
