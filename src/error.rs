//! Error types for each recovery boundary of the pipeline.
//!
//! Item errors skip one item, page errors end one source, sink errors abort
//! the run.

use std::path::PathBuf;

use thiserror::Error;

/// A fetch that failed after the fetcher exhausted its own retries.
#[derive(Debug, Error)]
#[error("failed to fetch {url} after {attempts} attempt(s)")]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Why a listing page produced no items.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a single listing item was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("item has no resolvable title")]
    Untitled,
    #[error("item has neither an id nor a usable uri")]
    MissingIdentifier,
    #[error("item identifier {0:?} is not an integer")]
    InvalidIdentifier(String),
}

/// A failure writing one of the persistence targets.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error on {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV error on {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("record fields {fields:?} are not in the header of {path}")]
    HeaderMismatch { path: PathBuf, fields: Vec<String> },
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}
