//! Run configuration.
//!
//! `FetchSettings` is layered: built-in defaults, then an optional TOML file,
//! then environment overrides. `StoreSettings` comes from the environment
//! only since it carries credentials. Both are plain values handed down to
//! the orchestrator and sinks; nothing in the core reads the environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use volscan_core::retrieval::{RateLimitClassifier, RetrievalConfig, DEFAULT_RATE_LIMIT_PHRASES};

use crate::orchestrator::OrchestratorConfig;

/// Hours east of UTC for the second capture timestamp (Asia/Seoul).
pub const DEFAULT_DISPLAY_OFFSET_HOURS: i32 = 9;

/// Offset for `hours` east of UTC, if representable.
pub fn display_offset(hours: i32) -> Option<FixedOffset> {
    hours.checked_mul(3600).and_then(FixedOffset::east_opt)
}

/// The default display offset, +09:00.
pub fn default_display_offset() -> FixedOffset {
    display_offset(DEFAULT_DISPLAY_OFFSET_HOURS).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for fetching: ticker source, retrieval, batching and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub tickers_file: PathBuf,
    pub chunk_size: usize,
    pub yf_period: String,
    pub yf_interval: String,
    /// Upstream request timeout in seconds.
    pub request_timeout: u64,
    pub max_retries: u32,
    pub inter_batch_pause_secs: u64,
    pub backoff_ladder_secs: Vec<u64>,
    pub parallel_within_batch: bool,
    pub require_positive_volume: bool,
    pub rate_limit_phrases: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            tickers_file: PathBuf::from("us_tickers.csv"),
            chunk_size: 50,
            yf_period: "5d".into(),
            yf_interval: "1d".into(),
            request_timeout: 30,
            max_retries: 3,
            inter_batch_pause_secs: 1,
            backoff_ladder_secs: vec![300, 600, 1200],
            parallel_within_batch: false,
            require_positive_volume: true,
            rate_limit_phrases: DEFAULT_RATE_LIMIT_PHRASES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl FetchSettings {
    /// Defaults, then `config_file` if given, then the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides from `lookup` and validate the result.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TICKERS_FILE") {
            self.tickers_file = PathBuf::from(v);
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunk_size = parse_value("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("YF_PERIOD") {
            self.yf_period = v.trim().to_string();
        }
        if let Some(v) = get("YF_INTERVAL") {
            self.yf_interval = v.trim().to_string();
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.request_timeout = parse_value("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_value("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("INTER_BATCH_PAUSE_SECS") {
            self.inter_batch_pause_secs = parse_value("INTER_BATCH_PAUSE_SECS", &v)?;
        }
        if let Some(v) = get("BACKOFF_LADDER_SECS") {
            self.backoff_ladder_secs = parse_list("BACKOFF_LADDER_SECS", &v)?;
        }
        if let Some(v) = get("PARALLEL_WITHIN_BATCH") {
            self.parallel_within_batch = parse_flag("PARALLEL_WITHIN_BATCH", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".into()));
        }
        if self.yf_period.trim().is_empty() || self.yf_interval.trim().is_empty() {
            return Err(ConfigError::Invalid("yf_period and yf_interval must be set".into()));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            period: self.yf_period.clone(),
            interval: self.yf_interval.clone(),
            max_retries: self.max_retries,
            require_positive_volume: self.require_positive_volume,
            ..RetrievalConfig::default()
        }
    }

    pub fn classifier(&self) -> RateLimitClassifier {
        RateLimitClassifier::new(&self.rate_limit_phrases)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_size: self.chunk_size,
            inter_batch_pause: Duration::from_secs(self.inter_batch_pause_secs),
            backoff_ladder: self
                .backoff_ladder_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            parallel_within_batch: self.parallel_within_batch,
        }
    }
}

/// Connection settings for the hosted table store.
#[derive(Clone, PartialEq)]
pub struct StoreSettings {
    /// Base URL without a trailing slash.
    pub url: String,
    pub service_role_key: String,
    pub table: String,
    pub latest_view: String,
    pub page_size_default: u32,
    pub page_size_max: u32,
    pub request_timeout: Duration,
    pub display_offset: FixedOffset,
}

// Keep the service key out of logs.
impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("url", &self.url)
            .field("service_role_key", &"<redacted>")
            .field("table", &self.table)
            .field("latest_view", &self.latest_view)
            .field("page_size_default", &self.page_size_default)
            .field("page_size_max", &self.page_size_max)
            .field("request_timeout", &self.request_timeout)
            .field("display_offset", &self.display_offset)
            .finish()
    }
}

impl StoreSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let url = get("SUPABASE_URL");
        let key = get("SUPABASE_SERVICE_ROLE_KEY");
        let (url, service_role_key) = match (url, key) {
            (Some(url), Some(key)) => (url, key),
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push("SUPABASE_URL".to_string());
                }
                if key.is_none() {
                    missing.push("SUPABASE_SERVICE_ROLE_KEY".to_string());
                }
                return Err(ConfigError::MissingEnv(missing));
            }
        };

        let page_size_default = match get("PAGE_SIZE_DEFAULT") {
            Some(v) => parse_value("PAGE_SIZE_DEFAULT", &v)?,
            None => 100,
        };
        let page_size_max = match get("PAGE_SIZE_MAX") {
            Some(v) => parse_value("PAGE_SIZE_MAX", &v)?,
            None => 200,
        };
        if page_size_default == 0 || page_size_max == 0 {
            return Err(ConfigError::Invalid("page sizes must be at least 1".into()));
        }

        let timeout_secs: u64 = match get("STORE_REQUEST_TIMEOUT") {
            Some(v) => parse_value("STORE_REQUEST_TIMEOUT", &v)?,
            None => 15,
        };

        let offset_hours: i32 = match get("DISPLAY_UTC_OFFSET_HOURS") {
            Some(v) => parse_value("DISPLAY_UTC_OFFSET_HOURS", &v)?,
            None => DEFAULT_DISPLAY_OFFSET_HOURS,
        };
        let offset = display_offset(offset_hours).ok_or_else(|| ConfigError::InvalidValue {
            key: "DISPLAY_UTC_OFFSET_HOURS".into(),
            value: offset_hours.to_string(),
        })?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key,
            table: get("SUPABASE_TABLE").unwrap_or_else(|| "volume_snapshots".into()),
            latest_view: get("SUPABASE_LATEST_VIEW").unwrap_or_else(|| "volume_snapshots_latest".into()),
            page_size_default: page_size_default.min(page_size_max),
            page_size_max,
            request_timeout: Duration::from_secs(timeout_secs),
            display_offset: offset,
        })
    }

    /// `{url}/rest/v1/{relation}`
    pub fn rest_endpoint(&self, relation: &str) -> String {
        format!("{}/rest/v1/{}", self.url, relation)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_list(key: &str, raw: &str) -> Result<Vec<u64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
