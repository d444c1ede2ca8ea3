pub mod coordinate_resolver;
pub mod error;
pub mod geocoder;
