use crate::retry::Transient;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinateError {
    #[error("Failed to read coordinate cache file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write coordinate cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode coordinate cache data from '{0}'")]
    CacheDecode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode coordinate cache data")]
    CacheEncode(#[source] Box<bincode::error::EncodeError>),

    #[error("Geocoding request failed for '{0}'")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Geocoding request for '{query}' failed with status {status}")]
    HttpStatus {
        query: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse geocoding response for '{0}'")]
    JsonParse(String, #[source] reqwest::Error),

    #[error("Geocoder returned an invalid coordinate for '{query}': lat={lat}, lon={lon}")]
    InvalidCoordinate {
        query: String,
        lat: String,
        lon: String,
    },

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl Transient for CoordinateError {
    fn is_transient(&self) -> bool {
        match self {
            CoordinateError::NetworkRequest(..) => true,
            CoordinateError::HttpStatus { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}
