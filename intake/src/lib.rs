pub mod api;
pub mod config;
pub mod envelope;
pub mod event;
pub mod ingest;
pub mod prometheus;
pub mod router;
pub mod server;
pub mod store;
