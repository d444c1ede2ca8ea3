use crate::types::cache_key::CacheKey;
use crate::types::location::LatLon;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column names of the weather cache file, in file order.
pub const CACHE_COLUMNS: [&str; 7] = [
    "latitude",
    "longitude",
    "date",
    "temperature_max",
    "temperature_min",
    "precipitation_sum",
    "wind_speed_max",
];

/// The four metric columns appended to enriched match tables.
pub const WEATHER_COLUMNS: [&str; 4] = [
    "temperature_max",
    "temperature_min",
    "precipitation_sum",
    "wind_speed_max",
];

/// One day of weather at one location, as stored in the cache.
///
/// Metrics are `None` when the archive reports no value for that day.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Rounded, see [`CacheKey`].
    pub latitude: f64,
    /// Rounded, see [`CacheKey`].
    pub longitude: f64,
    /// UTC calendar day.
    pub date: NaiveDate,
    /// `temperature_2m_max` in °C.
    pub temperature_max: Option<f64>,
    /// `temperature_2m_min` in °C.
    pub temperature_min: Option<f64>,
    /// `precipitation_sum` in mm.
    pub precipitation_sum: Option<f64>,
    /// `wind_speed_10m_max` in km/h.
    pub wind_speed_max: Option<f64>,
}

impl WeatherRecord {
    /// Builds a record whose coordinates and date are taken from `key`.
    pub fn from_key(
        key: CacheKey,
        temperature_max: Option<f64>,
        temperature_min: Option<f64>,
        precipitation_sum: Option<f64>,
        wind_speed_max: Option<f64>,
    ) -> Self {
        Self {
            latitude: key.latitude(),
            longitude: key.longitude(),
            date: key.date(),
            temperature_max,
            temperature_min,
            precipitation_sum,
            wind_speed_max,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(LatLon(self.latitude, self.longitude), self.date)
    }

    /// Same record with coordinates snapped to the key precision.
    pub fn normalized(self) -> Self {
        let key = self.key();
        Self {
            latitude: key.latitude(),
            longitude: key.longitude(),
            ..self
        }
    }

    /// Metric values in [`WEATHER_COLUMNS`] order.
    pub fn metrics(&self) -> [Option<f64>; 4] {
        [
            self.temperature_max,
            self.temperature_min,
            self.precipitation_sum,
            self.wind_speed_max,
        ]
    }
}
