//! Currency conversion demo service with simulated exchange rates, plus a
//! load tester that drives it.
//!
//! The `currency-api` binary serves conversions, rate history, health checks,
//! Prometheus metrics and a small dashboard. The `load-tester` binary runs
//! configurable request generators against it, and `seed-history` fills the
//! store with simulated rate history.
pub mod auth;
pub mod config;
pub mod currency;
pub mod error;
pub mod exchange_rate;
pub mod history;
pub mod loadtest;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod server;
pub mod store;
