//! One aggregation run: load configuration, dispatch probes, aggregate.

use crate::config::{ConfigError, ConfigProvider};
use crate::health::{AggregateVerdict, Dispatcher, Outcome, Probe, aggregate};
use crate::metrics::{MetricsCollector, RunOutcome};
use crate::util::RunId;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Errors that stop a run before it can produce a verdict.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Phases of a single run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Dispatching,
    AwaitingAll,
    Aggregated,
    Delivered,
    FailedToStart,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Dispatching => "dispatching",
            RunPhase::AwaitingAll => "awaiting_all",
            RunPhase::Aggregated => "aggregated",
            RunPhase::Delivered => "delivered",
            RunPhase::FailedToStart => "failed_to_start",
        };
        f.write_str(name)
    }
}

/// Ties a configuration provider to a dispatcher.
pub struct HealthService<P> {
    provider: Arc<dyn ConfigProvider>,
    dispatcher: Dispatcher<P>,
    metrics: MetricsCollector,
}

impl<P: Probe> HealthService<P> {
    /// Create a new health service.
    pub fn new(provider: Arc<dyn ConfigProvider>, prober: P, metrics: MetricsCollector) -> Self {
        Self {
            provider,
            dispatcher: Dispatcher::new(prober, metrics.clone()),
            metrics,
        }
    }

    /// Get the metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Execute one run.
    ///
    /// The configuration is obtained once, at the start. A configuration
    /// failure is returned as [`RunError`] and never reported as a verdict.
    #[instrument(skip_all, fields(run_id = %RunId::new()))]
    pub async fn run(&self) -> Result<AggregateVerdict, RunError> {
        let started = Instant::now();
        let mut phase = RunPhase::Idle;
        debug!(%phase, "run starting");

        let config = match self.provider.load() {
            Ok(config) => config,
            Err(e) => {
                phase = RunPhase::FailedToStart;
                error!(%phase, error = %e, "failed to load configuration");
                self.metrics
                    .record_run(RunOutcome::FailedToStart, started.elapsed());
                return Err(e.into());
            }
        };

        phase = RunPhase::Dispatching;
        debug!(
            %phase,
            endpoints = config.endpoints.len(),
            concurrency = config.probe.concurrency,
            "dispatching probes"
        );

        let dispatch = self.dispatcher.dispatch(Arc::clone(&config));
        phase = RunPhase::AwaitingAll;
        debug!(%phase, "waiting for all probes");
        let results = dispatch.await;

        let verdict = aggregate(results, &config.probe);
        phase = RunPhase::Aggregated;
        debug!(%phase, failed = verdict.failed.len(), "results aggregated");

        let duration = started.elapsed();
        match verdict.outcome {
            Outcome::Healthy => {
                self.metrics.record_run(RunOutcome::Healthy, duration);
                info!(
                    endpoints = verdict.results.len(),
                    duration_ms = duration.as_millis(),
                    "all endpoints healthy"
                );
            }
            Outcome::Degraded => {
                self.metrics.record_run(RunOutcome::Degraded, duration);
                for failure in &verdict.failed {
                    warn!(url = %failure.url, status = failure.status, "endpoint degraded");
                }
                info!(
                    endpoints = verdict.results.len(),
                    failed = verdict.failed.len(),
                    duration_ms = duration.as_millis(),
                    "endpoints degraded"
                );
            }
        }

        phase = RunPhase::Delivered;
        debug!(%phase, "run finished");
        Ok(verdict)
    }
}
