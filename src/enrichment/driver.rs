//! Joins daily weather onto match tables.
//!
//! Tournament names are resolved one distinct name at a time (the geocoder is
//! rate limited anyway), then every distinct (location, date) key is looked up
//! with bounded concurrency. Rows only copy values out of those lookups, so a
//! key shared by many matches is fetched at most once.

use crate::coordinates::coordinate_resolver::CoordinateResolver;
use crate::enrichment::outcome::{EnrichedFrame, EnrichmentReport, RowOutcome};
use crate::error::TennisWeatherError;
use crate::types::cache_key::CacheKey;
use crate::types::location::LatLon;
use crate::types::match_date::AnyMatchDate;
use crate::types::weather_record::{WeatherRecord, WEATHER_COLUMNS};
use crate::weather_data::cache_store::WeatherCacheStore;
use crate::weather_data::fetcher::WeatherFetcher;
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::error::Error;

pub const TOURNEY_NAME_COLUMN: &str = "tourney_name";
pub const TOURNEY_DATE_COLUMN: &str = "tourney_date";

type KeyLookups = HashMap<CacheKey, Result<WeatherRecord, String>>;

pub struct EnrichmentDriver<'a> {
    resolver: &'a CoordinateResolver,
    store: &'a WeatherCacheStore,
    fetcher: &'a WeatherFetcher,
    concurrency: usize,
}

impl<'a> EnrichmentDriver<'a> {
    pub fn new(
        resolver: &'a CoordinateResolver,
        store: &'a WeatherCacheStore,
        fetcher: &'a WeatherFetcher,
        concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            store,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Adds the four weather columns to `df` and reports one outcome per row.
    ///
    /// Existing weather columns are replaced. Only a missing `tourney_name` or
    /// `tourney_date` column fails the whole table; per-row problems end up in
    /// [`EnrichedFrame::outcomes`].
    pub async fn enrich(&self, mut df: DataFrame) -> Result<EnrichedFrame, TennisWeatherError> {
        let names = string_column(&df, TOURNEY_NAME_COLUMN)?;
        let dates: Vec<Option<NaiveDate>> = string_column(&df, TOURNEY_DATE_COLUMN)?
            .into_iter()
            .map(|value| value.and_then(|v| v.to_match_date()))
            .collect();

        let locations = self.resolve_names(&names).await;
        let planned: Vec<Result<CacheKey, RowOutcome>> = names
            .iter()
            .zip(&dates)
            .map(|(name, date)| {
                let location = name
                    .as_deref()
                    .and_then(|n| locations.get(n.trim()).copied().flatten());
                let Some(location) = location else {
                    return Err(RowOutcome::UnresolvedLocation);
                };
                let Some(date) = date else {
                    return Err(RowOutcome::InvalidDate);
                };
                Ok(CacheKey::new(location, *date))
            })
            .collect();

        let mut report = EnrichmentReport::default();
        let lookups = self.lookup_keys(&planned, &mut report).await;

        let mut outcomes = Vec::with_capacity(planned.len());
        let mut columns: [Vec<Option<f64>>; 4] = Default::default();
        for plan in planned {
            let (outcome, metrics) = match plan {
                Err(outcome) => (outcome, [None; 4]),
                Ok(key) => match lookups.get(&key) {
                    Some(Ok(record)) => (RowOutcome::Enriched, record.metrics()),
                    Some(Err(reason)) => (
                        RowOutcome::FetchFailed {
                            reason: reason.clone(),
                        },
                        [None; 4],
                    ),
                    None => (
                        RowOutcome::FetchFailed {
                            reason: format!("no lookup was made for {key}"),
                        },
                        [None; 4],
                    ),
                },
            };
            for (column, value) in columns.iter_mut().zip(metrics) {
                column.push(value);
            }
            report.count(&outcome);
            outcomes.push(outcome);
        }

        for (name, values) in WEATHER_COLUMNS.iter().zip(columns) {
            df.with_column(Series::new((*name).into(), values))?;
        }

        info!("Enriched match table: {}", report);
        Ok(EnrichedFrame {
            frame: df,
            outcomes,
            report,
        })
    }

    async fn resolve_names(&self, names: &[Option<String>]) -> HashMap<String, Option<LatLon>> {
        let mut locations = HashMap::new();
        for name in names.iter().flatten() {
            let name = name.trim();
            if name.is_empty() || locations.contains_key(name) {
                continue;
            }
            let location = self.resolver.resolve(name).await;
            locations.insert(name.to_string(), location);
        }
        debug!("Resolved {} distinct tournament names", locations.len());
        locations
    }

    async fn lookup_keys(
        &self,
        planned: &[Result<CacheKey, RowOutcome>],
        report: &mut EnrichmentReport,
    ) -> KeyLookups {
        let mut seen = HashSet::new();
        let keys: Vec<CacheKey> = planned
            .iter()
            .filter_map(|plan| plan.as_ref().ok().copied())
            .filter(|key| seen.insert(*key))
            .collect();
        debug!(
            "Looking up weather for {} distinct keys ({} in flight)",
            keys.len(),
            self.concurrency
        );

        let store = self.store;
        let fetcher = self.fetcher;
        let results: Vec<_> = stream::iter(keys)
            .map(|key| async move {
                let lookup = store.get_or_fetch(key, |k| fetcher.fetch(k)).await;
                (key, lookup)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut lookups = HashMap::with_capacity(results.len());
        for (key, result) in results {
            let entry = match result {
                Ok(lookup) => {
                    if lookup.was_hit() {
                        report.cache_hits += 1;
                    } else {
                        report.cache_misses += 1;
                    }
                    Ok(lookup.into_record())
                }
                Err(e) => {
                    report.cache_misses += 1;
                    let reason = error_chain(&e);
                    warn!("Weather lookup for {} failed: {}", key, reason);
                    Err(reason)
                }
            };
            lookups.insert(key, entry);
        }
        lookups
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, TennisWeatherError> {
    let column = df
        .column(name)
        .map_err(|_| TennisWeatherError::MissingColumn(name.to_string()))?;
    let column = column.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
