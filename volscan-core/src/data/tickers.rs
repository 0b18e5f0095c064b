//! Ticker list loading.
//!
//! The list is a single-column delimited file (extra columns are ignored).
//! Entries are trimmed and upper-cased; blanks and case-insensitive duplicates
//! are dropped while first-seen order is preserved.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::Symbol;

#[derive(Debug, Error)]
pub enum TickerSourceError {
    #[error("ticker source unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

/// Load the normalized, de-duplicated ticker list from a file.
pub fn load_tickers(path: &Path) -> Result<Vec<Symbol>, TickerSourceError> {
    let file = std::fs::File::open(path).map_err(|e| TickerSourceError::Unavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    read_tickers(file).map_err(|e| TickerSourceError::Unavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read tickers from any reader holding a delimited list.
pub fn read_tickers<R: Read>(reader: R) -> Result<Vec<Symbol>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut raw = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if let Some(first) = record.get(0) {
            raw.push(first.to_string());
        }
    }

    Ok(normalize_tickers(raw))
}

/// Normalize raw entries: trim, upper-case, drop blanks and duplicates.
pub fn normalize_tickers<I, S>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|entry| Symbol::parse(entry.as_ref()))
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}
