//! Multi-shape history retrieval for a single symbol.
//!
//! Request shapes are tried in a fixed order:
//! 1. `RecentWindow`: a short `1d` period
//! 2. `TrailingRange`: explicit dates from 7 days back through tomorrow
//! 3. `ConfiguredLookback`: the configured period and interval
//!
//! Each shape gets up to `max_retries` attempts on transient failures. A
//! response, usable or not, ends its shape; the last response is kept as a
//! fallback in case no shape produces a usable one. A rate-limit signal on
//! any attempt aborts the symbol and is returned to the caller.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rate_limit::{RateLimitClassifier, RateLimited};
use crate::data::{has_sufficient_volume, HistoryRequest, MarketDataClient, RawHistory};
use crate::domain::Symbol;

/// One of the three request forms, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    RecentWindow,
    TrailingRange,
    ConfiguredLookback,
}

impl RequestShape {
    pub const ORDER: [RequestShape; 3] = [
        RequestShape::RecentWindow,
        RequestShape::TrailingRange,
        RequestShape::ConfiguredLookback,
    ];
}

impl fmt::Display for RequestShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RecentWindow => "recent-window",
            Self::TrailingRange => "trailing-range",
            Self::ConfiguredLookback => "configured-lookback",
        };
        f.write_str(label)
    }
}

/// Parameters for history retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Lookback period for the last-resort shape (e.g. `5d`).
    pub period: String,
    /// Bar interval used by every shape (e.g. `1d`).
    pub interval: String,
    /// Attempts per shape on transient failures.
    pub max_retries: u32,
    /// Period for the first, short-window shape.
    pub recent_period: String,
    /// Days before `as_of` where the trailing range starts.
    pub trailing_days: i64,
    /// Stricter usability: every numeric volume must be positive.
    pub require_positive_volume: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            period: "5d".into(),
            interval: "1d".into(),
            max_retries: 3,
            recent_period: "1d".into(),
            trailing_days: 7,
            require_positive_volume: true,
        }
    }
}

impl RetrievalConfig {
    /// Concrete request for a shape as of a point in time.
    pub fn request_for(&self, shape: RequestShape, as_of: DateTime<Utc>) -> HistoryRequest {
        match shape {
            RequestShape::RecentWindow => HistoryRequest::Period {
                period: self.recent_period.clone(),
                interval: self.interval.clone(),
            },
            RequestShape::TrailingRange => HistoryRequest::Range {
                start: (as_of - Duration::days(self.trailing_days)).date_naive(),
                end: (as_of + Duration::days(1)).date_naive(),
                interval: self.interval.clone(),
            },
            RequestShape::ConfiguredLookback => HistoryRequest::Period {
                period: self.period.clone(),
                interval: self.interval.clone(),
            },
        }
    }
}

/// Response obtained with one shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeResult {
    pub shape: RequestShape,
    pub history: RawHistory,
    pub usable: bool,
}

/// One failed attempt that was retried or abandoned locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientFailure {
    pub shape: RequestShape,
    pub attempt: u32,
    pub message: String,
}

/// What retrieval produced for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// The usable response, else the last response of any kind, else nothing.
    pub best: Option<ShapeResult>,
    pub failures: Vec<TransientFailure>,
}

impl FetchOutcome {
    pub fn is_usable(&self) -> bool {
        self.best.as_ref().is_some_and(|r| r.usable)
    }

    /// Message of the most recent transient failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.failures.last().map(|f| f.message.as_str())
    }
}

/// Walks the request shapes for one symbol against an upstream client.
pub struct HistoryRetriever<'a> {
    client: &'a dyn MarketDataClient,
    config: &'a RetrievalConfig,
    classifier: &'a RateLimitClassifier,
}

impl<'a> HistoryRetriever<'a> {
    pub fn new(
        client: &'a dyn MarketDataClient,
        config: &'a RetrievalConfig,
        classifier: &'a RateLimitClassifier,
    ) -> Self {
        Self {
            client,
            config,
            classifier,
        }
    }

    pub fn fetch(&self, symbol: &Symbol, as_of: DateTime<Utc>) -> Result<FetchOutcome, RateLimited> {
        let attempts = self.config.max_retries.max(1);
        let mut outcome = FetchOutcome::default();

        for shape in RequestShape::ORDER {
            let request = self.config.request_for(shape, as_of);

            for attempt in 1..=attempts {
                match self.client.history(symbol, &request) {
                    Ok(history) => {
                        let usable =
                            has_sufficient_volume(&history, self.config.require_positive_volume);
                        outcome.best = Some(ShapeResult {
                            shape,
                            history,
                            usable,
                        });
                        if usable {
                            if shape != RequestShape::RecentWindow {
                                debug!(%symbol, %shape, "fetched using fallback shape");
                            }
                            return Ok(outcome);
                        }
                        debug!(%symbol, %shape, "insufficient data; trying next shape");
                        break;
                    }
                    Err(err) if self.classifier.is_rate_limited(&err) => {
                        warn!(%symbol, %shape, error = %err, "rate limit signal from provider");
                        return Err(RateLimited {
                            symbol: symbol.clone(),
                            shape,
                            message: err.to_string(),
                        });
                    }
                    Err(err) => {
                        warn!(
                            %symbol,
                            %shape,
                            attempt,
                            max = attempts,
                            error = %err,
                            "history request failed"
                        );
                        outcome.failures.push(TransientFailure {
                            shape,
                            attempt,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{daily_volumes, RequestMatcher, ScriptedClient, UpstreamError};
    use chrono::{NaiveDate, TimeZone};

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 21, 0, 0).unwrap()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn fetch(client: &ScriptedClient, config: &RetrievalConfig, s: &Symbol) -> Result<FetchOutcome, RateLimited> {
        let classifier = RateLimitClassifier::default();
        HistoryRetriever::new(client, config, &classifier).fetch(s, as_of())
    }

    #[test]
    fn trailing_range_spans_week_through_tomorrow() {
        let req = RetrievalConfig::default().request_for(RequestShape::TrailingRange, as_of());
        assert_eq!(
            req,
            HistoryRequest::Range {
                start: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 6, 13).unwrap(),
                interval: "1d".into(),
            }
        );
    }

    #[test]
    fn first_usable_shape_wins() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new().with_history(
            &aapl,
            RequestMatcher::Period("1d".into()),
            daily_volumes(start(), &[100, 200]),
        );
        let outcome = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap();
        let best = outcome.best.unwrap();
        assert_eq!(best.shape, RequestShape::RecentWindow);
        assert!(best.usable);
        assert_eq!(client.call_count(&aapl), 1);
    }

    #[test]
    fn falls_back_to_date_range_when_short_window_is_thin() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new()
            .with_history(&aapl, RequestMatcher::Period("1d".into()), daily_volumes(start(), &[100]))
            .with_history(&aapl, RequestMatcher::Range, daily_volumes(start(), &[100, 150]));
        let outcome = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap();
        let best = outcome.best.unwrap();
        assert_eq!(best.shape, RequestShape::TrailingRange);
        assert!(best.usable);
        assert!(outcome.failures.is_empty());
        assert_eq!(client.call_count(&aapl), 2);
    }

    #[test]
    fn transient_errors_retry_within_shape() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new().with_sequence(
            &aapl,
            RequestMatcher::Period("1d".into()),
            vec![
                Err(UpstreamError::Network("timed out".into())),
                Err(UpstreamError::Network("timed out".into())),
                Ok(daily_volumes(start(), &[5, 6])),
            ],
        );
        let outcome = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap();
        assert!(outcome.is_usable());
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures[1].attempt, 2);
        assert_eq!(client.call_count(&aapl), 3);
    }

    #[test]
    fn exhausted_retries_move_to_next_shape() {
        let aapl = sym("AAPL");
        let config = RetrievalConfig {
            max_retries: 2,
            ..RetrievalConfig::default()
        };
        let client = ScriptedClient::new()
            .with_error(&aapl, RequestMatcher::Period("1d".into()), UpstreamError::Other("boom".into()))
            .with_history(&aapl, RequestMatcher::Range, daily_volumes(start(), &[1, 2, 3]));
        let outcome = fetch(&client, &config, &aapl).unwrap();
        assert_eq!(outcome.best.unwrap().shape, RequestShape::TrailingRange);
        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(client.call_count(&aapl), 3);
    }

    #[test]
    fn rate_limit_aborts_remaining_shapes() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new()
            .with_history(&aapl, RequestMatcher::Period("1d".into()), RawHistory::empty())
            .with_error(
                &aapl,
                RequestMatcher::Range,
                UpstreamError::Other("Too Many Requests. Rate limited.".into()),
            )
            .with_history(&aapl, RequestMatcher::Period("5d".into()), daily_volumes(start(), &[1, 2]));
        let err = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap_err();
        assert_eq!(err.shape, RequestShape::TrailingRange);
        assert_eq!(err.symbol, aapl);
        // 1d once, range once, never the lookback shape
        assert_eq!(client.call_count(&aapl), 2);
    }

    #[test]
    fn keeps_last_unusable_response_as_fallback() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new()
            .with_history(&aapl, RequestMatcher::Period("1d".into()), daily_volumes(start(), &[7]))
            .with_history(&aapl, RequestMatcher::Range, RawHistory::empty())
            .with_history(&aapl, RequestMatcher::Period("5d".into()), daily_volumes(start(), &[0, 40]));
        let outcome = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap();
        let best = outcome.best.unwrap();
        assert_eq!(best.shape, RequestShape::ConfiguredLookback);
        assert!(!best.usable);
        assert_eq!(best.history.row_count(), 2);
    }

    #[test]
    fn nothing_returned_yields_none() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new().with_error(
            &aapl,
            RequestMatcher::Any,
            UpstreamError::Network("connection refused".into()),
        );
        let outcome = fetch(&client, &RetrievalConfig::default(), &aapl).unwrap();
        assert!(outcome.best.is_none());
        assert_eq!(outcome.failures.len(), 9);
        assert_eq!(outcome.last_error(), Some("network unreachable: connection refused"));
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let aapl = sym("AAPL");
        let config = RetrievalConfig {
            max_retries: 0,
            ..RetrievalConfig::default()
        };
        let client = ScriptedClient::new();
        let outcome = fetch(&client, &config, &aapl).unwrap();
        assert_eq!(client.call_count(&aapl), 3);
        assert!(outcome.best.unwrap().history.is_empty());
    }
}
