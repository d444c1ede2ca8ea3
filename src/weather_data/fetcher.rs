use crate::config::TennisWeatherConfig;
use crate::types::cache_key::CacheKey;
use crate::types::weather_record::WeatherRecord;
use crate::weather_data::error::WeatherDataError;
use crate::weather_data::http_cache::HttpCache;
use crate::retry::RetryPolicy;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};

const DAILY_VARIABLES: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max";

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    daily: ArchiveDaily,
}

#[derive(Debug, Deserialize)]
struct ArchiveDaily {
    time: Vec<String>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    wind_speed_10m_max: Vec<Option<f64>>,
}

/// Downloads single-day observations from the Open-Meteo archive.
///
/// Requests are rate limited, retried on transient failures and, when an
/// [`HttpCache`] is attached, answered from disk if the identical URL was
/// fetched before.
pub struct WeatherFetcher {
    client: Client,
    archive_url: String,
    api_key: Option<String>,
    http_cache: Option<HttpCache>,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
    requests_sent: AtomicUsize,
}

impl WeatherFetcher {
    pub fn new(client: Client, config: &TennisWeatherConfig, http_cache: Option<HttpCache>) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        );
        Self {
            client,
            archive_url: config.archive_url.clone(),
            api_key: config.api_key.clone(),
            http_cache,
            limiter: RateLimiter::direct(quota),
            retry: RetryPolicy::new(config.max_attempts, config.retry_base_delay),
            requests_sent: AtomicUsize::new(0),
        }
    }

    /// Number of HTTP requests actually sent to the archive (cache answers excluded).
    pub fn network_requests(&self) -> usize {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// The archive URL for `key`. The API key is not part of it, so cached
    /// responses stay valid when the key changes.
    pub fn request_url(&self, key: &CacheKey) -> String {
        let date = key.date().format("%Y-%m-%d");
        let separator = if self.archive_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}latitude={:.3}&longitude={:.3}&start_date={}&end_date={}&daily={}&timezone=UTC",
            self.archive_url,
            separator,
            key.latitude(),
            key.longitude(),
            date,
            date,
            DAILY_VARIABLES
        )
    }

    /// Fetches the weather for one key. Only called on a weather cache miss.
    pub async fn fetch(&self, key: CacheKey) -> Result<WeatherRecord, WeatherDataError> {
        let url = self.request_url(&key);

        if let Some(cache) = &self.http_cache {
            if let Some(body) = cache.get(&url).await {
                match parse_daily_response(&body, &url, key) {
                    Ok(record) => return Ok(record),
                    Err(e) => warn!("Discarding cached response for {}: {}", url, e),
                }
            }
        }

        let body = self.retry.run(|| self.download(&url)).await?;
        let record = parse_daily_response(&body, &url, key)?;

        if let Some(cache) = &self.http_cache {
            if let Err(e) = cache.put(&url, body).await {
                warn!("Failed to store HTTP response for {}: {}", url, e);
            }
        }
        Ok(record)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, WeatherDataError> {
        self.limiter.until_ready().await;
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        info!("Downloading daily weather from {}", url);

        let mut request = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("apikey", api_key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WeatherDataError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(match e.status() {
                    Some(status) => WeatherDataError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    },
                    None => WeatherDataError::NetworkRequest(url.to_string(), e),
                });
            }
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WeatherDataError::NetworkRequest(url.to_string(), e))?;
        debug!("Received {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

fn parse_daily_response(
    body: &[u8],
    url: &str,
    key: CacheKey,
) -> Result<WeatherRecord, WeatherDataError> {
    let response: ArchiveResponse = serde_json::from_slice(body)
        .map_err(|e| WeatherDataError::JsonParse(url.to_string(), e))?;
    let daily = response.daily;

    let Some(day) = daily.time.first() else {
        return Err(WeatherDataError::EmptyDailyData {
            url: url.to_string(),
        });
    };
    if *day != key.date().format("%Y-%m-%d").to_string() {
        warn!("Archive answered {} for requested day {}", day, key.date());
    }

    fn first(values: &[Option<f64>]) -> Option<f64> {
        values.first().copied().flatten()
    }
    Ok(WeatherRecord::from_key(
        key,
        first(&daily.temperature_2m_max),
        first(&daily.temperature_2m_min),
        first(&daily.precipitation_sum),
        first(&daily.wind_speed_10m_max),
    ))
}
