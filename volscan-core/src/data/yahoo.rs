//! Yahoo Finance history client.
//!
//! Fetches daily volume history from Yahoo's v8 chart API. This client only
//! performs single requests: retries, shape fallback, and rate-limit handling
//! belong to the retrieval strategy and the batch orchestrator.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::provider::{HistoryRequest, MarketDataClient, RawHistory, RawTimestamp, UpstreamError};
use crate::domain::Symbol;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    volume: Option<Vec<Option<f64>>>,
}

/// Yahoo Finance history client.
pub struct YahooClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        Self::with_base_url(timeout, DEFAULT_BASE_URL)
    }

    /// Point the client at a different chart endpoint (proxies, test servers).
    pub fn with_base_url(timeout: Duration, base_url: &str) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the chart API URL for a symbol and request shape.
    fn chart_url(base_url: &str, symbol: &Symbol, request: &HistoryRequest) -> String {
        match request {
            HistoryRequest::Period { period, interval } => format!(
                "{base_url}/{symbol}?range={period}&interval={interval}&includePrePost=false"
            ),
            HistoryRequest::Range {
                start,
                end,
                interval,
            } => format!(
                "{base_url}/{symbol}?period1={}&period2={}&interval={interval}&includePrePost=false",
                midnight_utc(*start),
                midnight_utc(*end),
            ),
        }
    }

    /// Parse the chart API response into a raw history table.
    fn parse_response(resp: ChartResponse) -> Result<RawHistory, UpstreamError> {
        let results = match resp.chart.result {
            Some(results) => results,
            None => {
                return match resp.chart.error {
                    Some(err) if err.code == "Not Found" => Ok(RawHistory::empty()),
                    Some(err) => Err(UpstreamError::ResponseFormat(format!(
                        "{}: {}",
                        err.code, err.description
                    ))),
                    None => Err(UpstreamError::ResponseFormat(
                        "empty result with no error".into(),
                    )),
                };
            }
        };

        let Some(data) = results.into_iter().next() else {
            return Ok(RawHistory::empty());
        };

        // Yahoo omits the timestamp array when the window holds no sessions.
        let Some(timestamps) = data.timestamp else {
            return Ok(RawHistory::empty());
        };

        let offset = data
            .meta
            .and_then(|m| m.gmtoffset)
            .and_then(FixedOffset::east_opt);

        let mut index = Vec::with_capacity(timestamps.len());
        for ts in timestamps {
            let utc = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                UpstreamError::ResponseFormat(format!("invalid timestamp: {ts}"))
            })?;
            index.push(match offset {
                Some(offset) => RawTimestamp::Zoned(utc.with_timezone(&offset)),
                None => RawTimestamp::Naive(utc.naive_utc()),
            });
        }

        let volume = data
            .indicators
            .quote
            .into_iter()
            .next()
            .and_then(|q| q.volume);

        Ok(RawHistory::new(index, volume))
    }
}

impl MarketDataClient for YahooClient {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<RawHistory, UpstreamError> {
        let url = Self::chart_url(&self.base_url, symbol, request);

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                UpstreamError::Network(e.to_string())
            } else {
                UpstreamError::Other(format!("request failed for {symbol}: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return error_for_status(status, &body, symbol);
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            UpstreamError::ResponseFormat(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(chart)
    }
}

/// Map a non-2xx chart response to its result.
///
/// Unknown or delisted symbols (404) are the provider's empty answer, not a
/// failure. Everything else keeps the status and a truncated body.
fn error_for_status(status: StatusCode, body: &str, symbol: &Symbol) -> Result<RawHistory, UpstreamError> {
    if status == StatusCode::NOT_FOUND {
        return Ok(RawHistory::empty());
    }

    let reason = status.canonical_reason().unwrap_or("error");
    let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if body.is_empty() {
        format!("{reason} for {symbol}")
    } else {
        format!("{reason} for {symbol}: {body}")
    };
    Err(UpstreamError::Http {
        status: status.as_u16(),
        message,
    })
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}
