//! Forward geocoding of tournament names through a Nominatim search endpoint.

use crate::coordinates::error::CoordinateError;
use crate::retry::RetryPolicy;
use crate::types::location::LatLon;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Rate-limited client for the Nominatim `/search` API. Network failures, 429
/// and 5xx answers are retried.
pub struct NominatimGeocoder {
    client: Client,
    search_url: String,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
}

impl NominatimGeocoder {
    pub fn new(client: Client, search_url: impl Into<String>, requests_per_second: u32) -> Self {
        let quota =
            Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            search_url: search_url.into(),
            limiter: RateLimiter::direct(quota),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Looks up the best match for `query`.
    ///
    /// Returns `Ok(None)` when the service answers but knows no such place.
    pub async fn geocode(&self, query: &str) -> Result<Option<LatLon>, CoordinateError> {
        self.retry.run(|| self.search(query)).await
    }

    async fn search(&self, query: &str) -> Result<Option<LatLon>, CoordinateError> {
        self.limiter.until_ready().await;
        debug!("Geocoding '{}' via {}", query, self.search_url);

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| CoordinateError::NetworkRequest(query.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Geocoder HTTP error for '{}': {:?}", query, e);
                return Err(match e.status() {
                    Some(status) => CoordinateError::HttpStatus {
                        query: query.to_string(),
                        status,
                        source: e,
                    },
                    None => CoordinateError::NetworkRequest(query.to_string(), e),
                });
            }
        };

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| CoordinateError::JsonParse(query.to_string(), e))?;

        let Some(place) = places.into_iter().next() else {
            debug!("Geocoder has no result for '{}'", query);
            return Ok(None);
        };

        let location = match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) if LatLon(lat, lon).is_valid() => LatLon(lat, lon),
            _ => {
                return Err(CoordinateError::InvalidCoordinate {
                    query: query.to_string(),
                    lat: place.lat,
                    lon: place.lon,
                })
            }
        };

        info!(
            "Geocoded '{}' to {} ({})",
            query,
            location,
            place.display_name.as_deref().unwrap_or("unnamed")
        );
        Ok(Some(location))
    }
}
