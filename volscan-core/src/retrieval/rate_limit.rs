//! Rate-limit classification of upstream failures.
//!
//! Providers report throttling as free text ("Too Many Requests", "Rate
//! limited. Try after a while."). A failure whose message contains one of the
//! known phrases, matched case-insensitively, is a rate-limit signal; anything
//! else is transient and retried locally. An HTTP 429 status counts as a
//! rate-limit signal too when the client exposes it.

use thiserror::Error;

use super::RequestShape;
use crate::data::UpstreamError;
use crate::domain::Symbol;

/// Phrases that mark a provider-side throttling response.
pub const DEFAULT_RATE_LIMIT_PHRASES: &[&str] =
    &["too many requests", "rate limit", "rate-limit", "ratelimit"];

const TOO_MANY_REQUESTS: u16 = 429;

/// How a single upstream failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry within the current request shape.
    Transient,
    /// Abort the symbol and escalate to batch-level backoff.
    RateLimited,
}

/// The provider is throttling us. Always propagated to the batch level.
#[derive(Debug, Clone, Error)]
#[error("rate limited while fetching {symbol} ({shape}): {message}")]
pub struct RateLimited {
    pub symbol: Symbol,
    pub shape: RequestShape,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitClassifier {
    phrases: Vec<String>,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_PHRASES.iter().copied())
    }
}

impl RateLimitClassifier {
    /// Build a classifier from custom phrases. Blank phrases are ignored.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Case-insensitive phrase match against free-text error output.
    pub fn matches_message(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }

    pub fn classify(&self, error: &UpstreamError) -> FailureKind {
        if error.status() == Some(TOO_MANY_REQUESTS) || self.matches_message(&error.to_string()) {
            FailureKind::RateLimited
        } else {
            FailureKind::Transient
        }
    }

    pub fn is_rate_limited(&self, error: &UpstreamError) -> bool {
        self.classify(error) == FailureKind::RateLimited
    }
}
