//! Scripted in-memory history client.
//!
//! Answers requests from per-symbol rules instead of the network. Used for
//! offline runs and to drive retrieval and orchestration tests with exact
//! failure sequences (transient errors, rate limits, empty windows).

use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDate, NaiveTime};

use super::provider::{HistoryRequest, MarketDataClient, RawHistory, RawTimestamp, UpstreamError};
use crate::domain::Symbol;

/// Which request shapes a rule answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMatcher {
    /// Period requests with exactly this period (e.g. `1d`).
    Period(String),
    /// Any explicit date-range request.
    Range,
    /// Every request.
    Any,
}

impl RequestMatcher {
    fn matches(&self, request: &HistoryRequest) -> bool {
        match (self, request) {
            (Self::Any, _) => true,
            (Self::Range, HistoryRequest::Range { .. }) => true,
            (Self::Period(want), HistoryRequest::Period { period, .. }) => want == period,
            _ => false,
        }
    }
}

struct Rule {
    symbol: Symbol,
    matcher: RequestMatcher,
    responses: Vec<Result<RawHistory, UpstreamError>>,
    served: usize,
}

impl Rule {
    /// Next scripted response; the last one repeats once the script runs out.
    fn next_response(&mut self) -> Result<RawHistory, UpstreamError> {
        let idx = self.served.min(self.responses.len().saturating_sub(1));
        self.served += 1;
        self.responses
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Ok(RawHistory::empty()))
    }
}

/// Deterministic client answering from scripted rules.
///
/// Rules are checked in insertion order; the first one matching the symbol and
/// request shape answers. Unscripted requests get an empty history.
#[derive(Default)]
pub struct ScriptedClient {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(Symbol, HistoryRequest)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `history` for matching requests.
    pub fn with_history(self, symbol: &Symbol, matcher: RequestMatcher, history: RawHistory) -> Self {
        self.with_sequence(symbol, matcher, vec![Ok(history)])
    }

    /// Always fail matching requests with `error`.
    pub fn with_error(self, symbol: &Symbol, matcher: RequestMatcher, error: UpstreamError) -> Self {
        self.with_sequence(symbol, matcher, vec![Err(error)])
    }

    /// Answer matching requests from `responses` in order, repeating the last.
    pub fn with_sequence(
        self,
        symbol: &Symbol,
        matcher: RequestMatcher,
        responses: Vec<Result<RawHistory, UpstreamError>>,
    ) -> Self {
        lock(&self.rules).push(Rule {
            symbol: symbol.clone(),
            matcher,
            responses,
            served: 0,
        });
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<(Symbol, HistoryRequest)> {
        lock(&self.calls).clone()
    }

    /// Number of requests received for one symbol.
    pub fn call_count(&self, symbol: &Symbol) -> usize {
        lock(&self.calls).iter().filter(|(s, _)| s == symbol).count()
    }
}

impl MarketDataClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<RawHistory, UpstreamError> {
        lock(&self.calls).push((symbol.clone(), request.clone()));

        let mut rules = lock(&self.rules);
        match rules
            .iter_mut()
            .find(|r| &r.symbol == symbol && r.matcher.matches(request))
        {
            Some(rule) => rule.next_response(),
            None => Ok(RawHistory::empty()),
        }
    }
}

/// Daily history starting at `start`, one row per volume, midnight UTC stamps.
pub fn daily_volumes(start: NaiveDate, volumes: &[u64]) -> RawHistory {
    let index = (0..volumes.len())
        .map(|i| RawTimestamp::Naive((start + Duration::days(i as i64)).and_time(NaiveTime::MIN)))
        .collect();
    let column = volumes.iter().map(|&v| Some(v as f64)).collect();
    RawHistory::new(index, Some(column))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn period(p: &str) -> HistoryRequest {
        HistoryRequest::Period {
            period: p.into(),
            interval: "1d".into(),
        }
    }

    #[test]
    fn sequence_repeats_last_response() {
        let aapl = sym("AAPL");
        let client = ScriptedClient::new().with_sequence(
            &aapl,
            RequestMatcher::Any,
            vec![
                Err(UpstreamError::Other("first".into())),
                Ok(RawHistory::empty()),
            ],
        );
        assert!(client.history(&aapl, &period("1d")).is_err());
        assert!(client.history(&aapl, &period("1d")).is_ok());
        assert!(client.history(&aapl, &period("1d")).is_ok());
        assert_eq!(client.call_count(&aapl), 3);
    }

    #[test]
    fn matcher_selects_shape() {
        let aapl = sym("AAPL");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let client = ScriptedClient::new()
            .with_history(&aapl, RequestMatcher::Period("1d".into()), RawHistory::empty())
            .with_history(&aapl, RequestMatcher::Range, daily_volumes(start, &[1, 2]));

        assert!(client.history(&aapl, &period("1d")).unwrap().is_empty());
        let ranged = client
            .history(
                &aapl,
                &HistoryRequest::Range {
                    start,
                    end: start,
                    interval: "1d".into(),
                },
            )
            .unwrap();
        assert_eq!(ranged.row_count(), 2);
        // No rule for 5d → empty
        assert!(client.history(&aapl, &period("5d")).unwrap().is_empty());
    }
}
