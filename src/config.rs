//! Runtime configuration for a [`crate::TennisWeather`] client.

use bon::Builder;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = concat!("tennis-weather/", env!("CARGO_PKG_VERSION"));

/// Settings shared by the resolver, the fetcher and the enrichment driver.
///
/// Only `cache_dir` is required; everything else has a default suited to the
/// public Open-Meteo and Nominatim endpoints.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tennis_weather::TennisWeatherConfig;
///
/// let config = TennisWeatherConfig::builder()
///     .cache_dir("/tmp/tennis_weather")
///     .concurrency(8)
///     .request_timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(config.concurrency, 8);
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, Builder)]
pub struct TennisWeatherConfig {
    /// Directory holding the weather cache, the coordinate table and the HTTP cache.
    #[builder(into)]
    pub cache_dir: PathBuf,

    /// Daily archive endpoint.
    #[builder(into, default = DEFAULT_ARCHIVE_URL.to_string())]
    pub archive_url: String,

    /// Nominatim-compatible search endpoint.
    #[builder(into, default = DEFAULT_GEOCODER_URL.to_string())]
    pub geocoder_url: String,

    /// Sent as `apikey` to the archive (commercial Open-Meteo endpoints).
    #[builder(into)]
    pub api_key: Option<String>,

    #[builder(into, default = DEFAULT_USER_AGENT.to_string())]
    pub user_agent: String,

    #[builder(default = Duration::from_secs(10))]
    pub request_timeout: Duration,

    /// Maximum number of weather lookups in flight during enrichment.
    #[builder(default = 4)]
    pub concurrency: usize,

    /// Archive request budget.
    #[builder(default = 5)]
    pub requests_per_second: u32,

    /// Geocoder request budget. Nominatim's usage policy allows one per second.
    #[builder(default = 1)]
    pub geocoder_requests_per_second: u32,

    /// Total attempts per archive or geocoder request, including the first.
    #[builder(default = 3)]
    pub max_attempts: u32,

    #[builder(default = Duration::from_millis(500))]
    pub retry_base_delay: Duration,

    /// Geocoded coordinates older than this are dropped when the table is loaded.
    #[builder(default = Duration::from_secs(180 * 24 * 60 * 60))]
    pub coordinate_ttl: Duration,

    /// Keep raw archive responses under `<cache_dir>/http_cache`.
    #[builder(default = true)]
    pub http_cache: bool,
}

impl TennisWeatherConfig {
    /// Default settings rooted at `cache_dir`.
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self::builder().cache_dir(cache_dir).build()
    }
}
