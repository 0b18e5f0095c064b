//! Upstream retrieval: rate-limit classification and the multi-shape fetch

pub mod rate_limit;
pub mod strategy;

pub use rate_limit::{FailureKind, RateLimitClassifier, RateLimited, DEFAULT_RATE_LIMIT_PHRASES};
pub use strategy::{
    FetchOutcome, HistoryRetriever, RequestShape, RetrievalConfig, ShapeResult, TransientFailure,
};
