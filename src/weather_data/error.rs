use crate::retry::Transient;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherDataError {
    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to write weather cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode weather records for cache file '{0}'")]
    CacheEncode(PathBuf, #[source] PolarsError),

    #[error("Failed to parse weather cache file '{0}'")]
    CacheParse(PathBuf, #[source] PolarsError),

    #[error("Weather cache file '{path}' is missing column '{column}'")]
    CacheSchema { path: PathBuf, column: String },

    #[error("Failed to write HTTP cache entry '{0}'")]
    HttpCacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse archive response from {0}")]
    JsonParse(String, #[source] serde_json::Error),

    #[error("Archive response from {url} has no daily values")]
    EmptyDailyData { url: String },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Transport failures, rate limiting (429) and server-side errors (5xx).
impl Transient for WeatherDataError {
    fn is_transient(&self) -> bool {
        match self {
            WeatherDataError::NetworkRequest(..) => true,
            WeatherDataError::HttpStatus { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
