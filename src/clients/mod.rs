pub mod enrich_client;
