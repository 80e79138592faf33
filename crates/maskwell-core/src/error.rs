//! Error types for the redaction engine

use thiserror::Error;

/// Failure of a single detector. Always contained by the collector.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector '{detector}' failed: {reason}")]
    Failed { detector: String, reason: String },

    #[error("detector '{detector}' panicked")]
    Panicked { detector: String },
}

/// Failure of the backing mapping store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),
}

/// Failure of a label translation. Soft-failed by the localizer.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation timed out after {0} ms")]
    Timeout(u128),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("category '{0}' is already registered")]
    DuplicateCategory(String),

    #[error("invalid category name {0:?}: expected [a-z][a-z0-9_]*")]
    InvalidCategory(String),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("invalid pattern for category '{category}': {source}")]
    InvalidPattern {
        category: String,
        #[source]
        source: regex::Error,
    },

    #[error("mapping store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
