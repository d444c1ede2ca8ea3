use crate::coordinates::error::CoordinateError;
use crate::weather_data::error::WeatherDataError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TennisWeatherError {
    #[error(transparent)]
    WeatherData(#[from] WeatherDataError),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Failed to build HTTP client")]
    HttpClientBuild(#[source] reqwest::Error),

    #[error("Failed to read match file '{0}'")]
    InputRead(PathBuf, #[source] PolarsError),

    #[error("Failed to list input directory '{0}'")]
    InputDirectory(PathBuf, #[source] std::io::Error),

    #[error("Failed to write enriched file '{0}'")]
    OutputWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode enriched file '{0}'")]
    OutputEncode(PathBuf, #[source] PolarsError),

    #[error("Match table is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Failed processing match table: {0}")]
    DataFrameProcessing(#[from] PolarsError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
