//! Ticker lists, upstream history clients, and history canonicalization

pub mod canonicalize;
pub mod provider;
pub mod scripted;
pub mod tickers;
pub mod yahoo;

pub use canonicalize::{canonicalize, has_sufficient_volume};
pub use provider::{HistoryRequest, MarketDataClient, RawHistory, RawTimestamp, UpstreamError};
pub use scripted::{daily_volumes, RequestMatcher, ScriptedClient};
pub use tickers::{load_tickers, normalize_tickers, read_tickers, TickerSourceError};
pub use yahoo::YahooClient;
