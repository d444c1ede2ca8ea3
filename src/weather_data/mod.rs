pub mod cache_store;
pub mod error;
pub mod fetcher;
pub mod http_cache;
