use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error as ThisError;

/// Fatal setup problems. Jobs abort on these before touching the API or the database.
#[derive(ThisError, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Batch index {index} out of range (batch count {count})")]
    BatchOutOfRange { index: usize, count: usize },

    #[error("Failed to load item catalog: {0}")]
    Catalog(String),
}

/// Failures talking to the marketplace API.
///
/// Callers log these per item and move on; the client never retries.
#[derive(ThisError, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Bconomy API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Unexpected response: {0}")]
    Parse(String),
}

#[derive(ThisError, Debug)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
}
