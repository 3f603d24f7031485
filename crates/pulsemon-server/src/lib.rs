//! The pulsemon server: HTTP ingestion and lookup over a pluggable metric
//! store.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod state;
