//! Health probing, fan-out, and verdict aggregation.

mod dispatcher;
mod prober;
mod service;
mod verdict;

pub use dispatcher::Dispatcher;
pub use prober::{HttpProber, Probe, ProbeResult, UNAVAILABLE_STATUS};
pub use service::{HealthService, RunError, RunPhase};
pub use verdict::{AggregateVerdict, Outcome, aggregate};
