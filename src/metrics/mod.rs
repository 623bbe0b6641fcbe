//! Metrics collection and exposition.

mod collector;

pub use collector::{InFlightGuard, MetricsCollector, RunOutcome};
