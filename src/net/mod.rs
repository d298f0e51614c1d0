pub mod api;
pub mod backoff;
pub mod connection;
pub mod types;
