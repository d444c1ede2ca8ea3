mod clients;
mod config;
mod coordinates;
mod enrichment;
mod error;
mod retry;
mod tennis_weather;
mod types;
mod utils;
mod weather_data;

pub use error::TennisWeatherError;
pub use tennis_weather::*;

pub use clients::enrich_client::*;
pub use config::*;

pub use types::cache_key::{round_coordinate, CacheKey, COORDINATE_DECIMALS};
pub use types::location::LatLon;
pub use types::match_date::AnyMatchDate;
pub use types::weather_record::{WeatherRecord, CACHE_COLUMNS, WEATHER_COLUMNS};

pub use coordinates::coordinate_resolver::{CoordinateResolver, SEED_COORDINATES};
pub use coordinates::error::CoordinateError;
pub use coordinates::geocoder::NominatimGeocoder;

pub use enrichment::driver::{EnrichmentDriver, TOURNEY_DATE_COLUMN, TOURNEY_NAME_COLUMN};
pub use enrichment::files::{DEFAULT_FILE_PREFIX, OUTPUT_SUFFIX};
pub use enrichment::outcome::*;

pub use weather_data::cache_store::{CacheLookup, WeatherCacheStore, WEATHER_CACHE_FILE_NAME};
pub use weather_data::error::WeatherDataError;
pub use weather_data::fetcher::WeatherFetcher;
pub use weather_data::http_cache::{HttpCache, HTTP_CACHE_DIR_NAME};
pub use retry::{RetryPolicy, Transient};
pub use utils::get_cache_dir;
