//! Hosted table store: snapshot upload and the latest-results reader.
//!
//! Both sides talk to a PostgREST-style endpoint (`{url}/rest/v1/{relation}`)
//! authenticated with a service key sent as `apikey` and as a bearer token.

pub mod latest;
pub mod sink;

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use thiserror::Error;

pub use latest::{
    page_meta, parse_content_range_total, LatestClient, LatestPage, LatestRow, PageMeta, PageRequest,
};
pub use sink::{MemorySink, RestSink, RunStamp, SnapshotRow, SnapshotSink, UPSERT_CHUNK_SIZE};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("store request failed: {0}")]
    Network(String),

    #[error("store client setup failed: {0}")]
    Build(String),

    #[error("decode store response: {0}")]
    Decode(String),
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, StoreError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StoreError::Build(e.to_string()))
}

pub(crate) fn authorized(request: RequestBuilder, key: &str) -> RequestBuilder {
    request
        .header("apikey", key)
        .header("Authorization", format!("Bearer {key}"))
}

/// Send a request and turn non-2xx responses into `StoreError::Http`.
pub(crate) fn send(request: RequestBuilder) -> Result<Response, StoreError> {
    let response = request.send().map_err(|e| StoreError::Network(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}
