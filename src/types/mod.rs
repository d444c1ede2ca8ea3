pub mod cache_key;
pub mod location;
pub mod match_date;
pub mod weather_record;
