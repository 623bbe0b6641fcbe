//! Metrics collector using prometheus-client.
//!
//! Provides metrics for aggregation runs, individual probes, and probe concurrency.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for run metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RunLabels {
    pub outcome: RunOutcome,
}

/// How a run ended.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RunOutcome {
    Healthy,
    Degraded,
    FailedToStart,
}

/// Labels for probe metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    pub status: String,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total runs counter, by outcome.
    runs_total: Family<RunLabels, Counter>,
    /// Run duration histogram (in seconds).
    run_duration_seconds: Histogram,
    /// Total probes counter, by status code.
    probes_total: Family<ProbeLabels, Counter>,
    /// Probe duration histogram (in seconds).
    probe_duration_seconds: Histogram,
    /// Probes currently holding an admission permit.
    probes_in_flight: Gauge,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let runs_total = Family::<RunLabels, Counter>::default();
        // Buckets: 1ms .. ~60s
        let run_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.5, 13));
        let probes_total = Family::<ProbeLabels, Counter>::default();
        let probe_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.5, 13));
        let probes_in_flight = Gauge::default();

        registry.register(
            "healthgate_runs",
            "Total number of aggregation runs",
            runs_total.clone(),
        );
        registry.register(
            "healthgate_run_duration_seconds",
            "Aggregation run duration in seconds",
            run_duration_seconds.clone(),
        );
        registry.register(
            "healthgate_probes",
            "Total number of probes by response code",
            probes_total.clone(),
        );
        registry.register(
            "healthgate_probe_duration_seconds",
            "Probe duration in seconds",
            probe_duration_seconds.clone(),
        );
        registry.register(
            "healthgate_probes_in_flight",
            "Number of probes currently in flight",
            probes_in_flight.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                runs_total,
                run_duration_seconds,
                probes_total,
                probe_duration_seconds,
                probes_in_flight,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a finished run.
    pub fn record_run(&self, outcome: RunOutcome, duration: Duration) {
        self.inner
            .runs_total
            .get_or_create(&RunLabels { outcome })
            .inc();
        self.inner
            .run_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a finished probe.
    pub fn record_probe(&self, status: u16, duration: Duration) {
        let labels = ProbeLabels {
            status: status.to_string(),
        };
        self.inner.probes_total.get_or_create(&labels).inc();
        self.inner
            .probe_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Mark a probe as in flight. The gauge is decremented when the guard drops.
    pub fn probe_started(&self) -> InFlightGuard {
        self.inner.probes_in_flight.inc();
        InFlightGuard {
            collector: self.clone(),
        }
    }

    /// Current number of in-flight probes.
    pub fn probes_in_flight(&self) -> i64 {
        self.inner.probes_in_flight.get()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that keeps the in-flight gauge raised while a probe runs.
pub struct InFlightGuard {
    collector: MetricsCollector,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.collector.inner.probes_in_flight.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    fn encoded(collector: &MetricsCollector) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, collector.registry()).unwrap();
        buffer
    }

    #[test]
    fn test_record_run() {
        let collector = MetricsCollector::new();
        collector.record_run(RunOutcome::Degraded, Duration::from_millis(40));

        let buffer = encoded(&collector);
        assert!(buffer.contains("healthgate_runs_total{outcome=\"Degraded\"} 1"));
        assert!(buffer.contains("healthgate_run_duration_seconds"));
    }

    #[test]
    fn test_record_probe() {
        let collector = MetricsCollector::new();
        collector.record_probe(503, Duration::from_millis(5));
        collector.record_probe(503, Duration::from_millis(5));

        let buffer = encoded(&collector);
        assert!(buffer.contains("healthgate_probes_total{status=\"503\"} 2"));
    }

    #[test]
    fn test_in_flight_guard() {
        let collector = MetricsCollector::new();
        let first = collector.probe_started();
        let second = collector.probe_started();
        assert_eq!(collector.probes_in_flight(), 2);

        drop(first);
        assert_eq!(collector.probes_in_flight(), 1);
        drop(second);
        assert_eq!(collector.probes_in_flight(), 0);
    }
}
