//! The identity of a cached weather observation: a rounded coordinate plus a calendar date.

use crate::types::location::LatLon;
use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use std::fmt;

/// Number of decimal places coordinates are rounded to before they are used as a key.
///
/// Three decimals is roughly 110 m of latitude; resolutions of one venue that
/// drift in the fourth decimal share a cache entry.
pub const COORDINATE_DECIMALS: i32 = 3;

/// Rounds a coordinate component to [`COORDINATE_DECIMALS`] places.
pub fn round_coordinate(value: f64) -> f64 {
    let scale = 10f64.powi(COORDINATE_DECIMALS);
    // `+ 0.0` folds -0.0 into 0.0
    (value * scale).round() / scale + 0.0
}

/// Key of the weather cache: (latitude, longitude, date) with rounded coordinates.
///
/// Two keys built from coordinates that agree to [`COORDINATE_DECIMALS`] places
/// compare and hash equal.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use tennis_weather::{CacheKey, LatLon};
///
/// let date = NaiveDate::from_ymd_opt(2023, 7, 10).unwrap();
/// let a = CacheKey::new(LatLon(51.4338, -0.2142), date);
/// let b = CacheKey::new(LatLon(51.43381, -0.21421), date);
/// assert_eq!(a, b);
/// assert_eq!(a.latitude(), 51.434);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    latitude: OrderedFloat<f64>,
    longitude: OrderedFloat<f64>,
    date: NaiveDate,
}

impl CacheKey {
    pub fn new(location: LatLon, date: NaiveDate) -> Self {
        Self {
            latitude: OrderedFloat(round_coordinate(location.0)),
            longitude: OrderedFloat(round_coordinate(location.1)),
            date,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude.into_inner()
    }

    pub fn longitude(&self) -> f64 {
        self.longitude.into_inner()
    }

    pub fn location(&self) -> LatLon {
        LatLon(self.latitude(), self.longitude())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3},{:.3}@{}",
            self.latitude(),
            self.longitude(),
            self.date.format("%Y-%m-%d")
        )
    }
}
