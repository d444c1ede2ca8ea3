//! The main entry point: [`TennisWeather`].

use crate::clients::enrich_client::MatchEnricher;
use crate::config::TennisWeatherConfig;
use crate::coordinates::coordinate_resolver::CoordinateResolver;
use crate::coordinates::geocoder::NominatimGeocoder;
use crate::error::TennisWeatherError;
use crate::retry::RetryPolicy;
use crate::types::cache_key::CacheKey;
use crate::types::location::LatLon;
use crate::types::weather_record::WeatherRecord;
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use crate::weather_data::cache_store::WeatherCacheStore;
use crate::weather_data::fetcher::WeatherFetcher;
use crate::weather_data::http_cache::HttpCache;
use bon::bon;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use std::path::PathBuf;

/// Looks up historical daily weather for tennis tournaments and joins it onto
/// match tables.
///
/// One instance owns the coordinate resolver, the weather cache and the
/// archive fetcher for a whole run. Everything it learns is written to the
/// cache directory as it goes; call [`TennisWeather::close`] at the end to
/// compact the weather cache file.
///
/// # Examples
///
/// ```no_run
/// # use tennis_weather::{TennisWeather, TennisWeatherError};
/// # use chrono::NaiveDate;
/// # #[tokio::main]
/// # async fn main() -> Result<(), TennisWeatherError> {
/// let client = TennisWeather::new().await?;
/// let date = NaiveDate::from_ymd_opt(2023, 7, 10).unwrap();
///
/// if let Some(record) = client.lookup("Wimbledon").date(date).call().await? {
///     println!("Max temperature: {:?} °C", record.temperature_max);
/// }
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct TennisWeather {
    config: TennisWeatherConfig,
    resolver: CoordinateResolver,
    store: WeatherCacheStore,
    fetcher: WeatherFetcher,
}

#[bon]
impl TennisWeather {
    /// Creates a client from a full configuration.
    ///
    /// The cache directory is created if needed, the coordinate table and the
    /// weather cache are loaded from it.
    ///
    /// # Errors
    ///
    /// Returns [`TennisWeatherError::CacheDirCreation`] if the cache directory cannot
    /// be created, [`TennisWeatherError::HttpClientBuild`] if the HTTP client cannot be
    /// built and [`TennisWeatherError::WeatherData`] if the weather cache file cannot
    /// be created or replaced.
    pub async fn with_config(config: TennisWeatherConfig) -> Result<Self, TennisWeatherError> {
        ensure_cache_dir_exists(&config.cache_dir)
            .await
            .map_err(|e| TennisWeatherError::CacheDirCreation(config.cache_dir.clone(), e))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(TennisWeatherError::HttpClientBuild)?;

        let geocoder = NominatimGeocoder::new(
            client.clone(),
            &config.geocoder_url,
            config.geocoder_requests_per_second,
        )
        .with_retry(RetryPolicy::new(config.max_attempts, config.retry_base_delay));
        let resolver =
            CoordinateResolver::new(&config.cache_dir, geocoder, config.coordinate_ttl).await;
        let store = WeatherCacheStore::open(&config.cache_dir).await?;
        let http_cache = if config.http_cache {
            Some(HttpCache::new(&config.cache_dir).await?)
        } else {
            None
        };
        let fetcher = WeatherFetcher::new(client, &config, http_cache);

        info!(
            "Tennis weather client ready (cache: {})",
            config.cache_dir.display()
        );
        Ok(Self {
            config,
            resolver,
            store,
            fetcher,
        })
    }

    /// Creates a client with default settings, caching in `cache_folder`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use tennis_weather::{TennisWeather, TennisWeatherError};
    /// # async fn run() -> Result<(), TennisWeatherError> {
    /// let client = TennisWeather::with_cache_folder("/tmp/tennis_weather".into()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_cache_folder(cache_folder: PathBuf) -> Result<Self, TennisWeatherError> {
        Self::with_config(TennisWeatherConfig::in_dir(cache_folder)).await
    }

    /// Creates a client with default settings in the system cache directory
    /// (e.g. `~/.cache/tennis_weather_cache` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`TennisWeatherError::CacheDirResolution`] if there is no system cache
    /// directory, plus everything [`TennisWeather::with_config`] can return.
    pub async fn new() -> Result<Self, TennisWeatherError> {
        let cache_folder = get_cache_dir().map_err(TennisWeatherError::CacheDirResolution)?;
        Self::with_cache_folder(cache_folder).await
    }

    /// Weather on `date` at the venue of `tournament`.
    ///
    /// Returns `Ok(None)` when the tournament cannot be placed. The weather
    /// cache is consulted first; a miss costs one archive request and the
    /// result is stored before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`TennisWeatherError::WeatherData`] if the archive request fails or the
    /// record cannot be written to the cache.
    #[builder(start_fn = lookup)]
    #[doc(hidden)]
    pub async fn build_lookup(
        &self,
        #[builder(start_fn)] tournament: &str,
        date: NaiveDate,
    ) -> Result<Option<WeatherRecord>, TennisWeatherError> {
        let Some(location) = self.resolver.resolve(tournament).await else {
            debug!("No venue for '{}', skipping weather lookup", tournament);
            return Ok(None);
        };
        self.weather_at(location, date).await.map(Some)
    }

    /// Weather on `date` at `location`, from the cache or the archive.
    pub async fn weather_at(
        &self,
        location: LatLon,
        date: NaiveDate,
    ) -> Result<WeatherRecord, TennisWeatherError> {
        let key = CacheKey::new(location, date);
        let lookup = self
            .store
            .get_or_fetch(key, |k| self.fetcher.fetch(k))
            .await?;
        Ok(lookup.into_record())
    }

    /// Starts an enrichment of a match table, a match file or a directory of
    /// match files. See [`MatchEnricher`].
    pub fn enrich(&self) -> MatchEnricher<'_> {
        MatchEnricher::new(self)
    }

    pub fn config(&self) -> &TennisWeatherConfig {
        &self.config
    }

    pub fn resolver(&self) -> &CoordinateResolver {
        &self.resolver
    }

    pub fn store(&self) -> &WeatherCacheStore {
        &self.store
    }

    pub fn fetcher(&self) -> &WeatherFetcher {
        &self.fetcher
    }

    /// Archive requests sent over the network by this client so far.
    pub fn network_requests(&self) -> usize {
        self.fetcher.network_requests()
    }

    /// Ends the run: rewrites the weather cache with one row per key.
    ///
    /// Every record is already on disk when this is called, so skipping it
    /// loses nothing.
    pub async fn close(self) -> Result<(), TennisWeatherError> {
        self.store.compact().await?;
        info!(
            "Closed tennis weather client ({} archive requests)",
            self.fetcher.network_requests()
        );
        Ok(())
    }
}
