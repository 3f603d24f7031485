//! The pulsemon agent: samples host metrics and reports them to the server.

pub mod client;
pub mod config;
pub mod reporter;
pub mod worker_pool;
