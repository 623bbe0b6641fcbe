//! healthgate - a concurrent HTTP health-check aggregator
//!
//! This crate probes a configured set of HTTP endpoints and reports one
//! verdict for all of them:
//! - Bounded-parallel fan-out with a per-probe timeout and optional run deadline
//! - Allow-list classification of response codes
//! - Configuration re-read for every run (or cached with an explicit TTL)
//! - A `/health` endpoint answering 200 or 424, plus Prometheus metrics

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod util;

pub use config::RunConfig;
pub use health::{AggregateVerdict, HealthService, HttpProber};
