//! Bounded fan-out of probes over the endpoint set.
//!
//! Admission and completion are separate mechanisms: a semaphore limits how
//! many probes run at once, while the join over every spawned task is the
//! barrier that decides when the dispatch is over. Results travel over a
//! channel to a single collector that owns the result slots.

use crate::config::RunConfig;
use crate::health::{Probe, ProbeResult};
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Runs probes for every endpoint of a run, at most `concurrency` at a time.
pub struct Dispatcher<P> {
    prober: Arc<P>,
    metrics: MetricsCollector,
}

impl<P: Probe> Dispatcher<P> {
    /// Create a new dispatcher.
    pub fn new(prober: P, metrics: MetricsCollector) -> Self {
        Self {
            prober: Arc::new(prober),
            metrics,
        }
    }

    /// Probe every endpoint and return one result per endpoint, in
    /// declaration order.
    ///
    /// Never returns early: a failed endpoint does not stop the others. If
    /// the run has a deadline, probes still waiting or in flight when it
    /// passes resolve to the synthetic unavailable result.
    pub async fn dispatch(&self, run: Arc<RunConfig>) -> Vec<ProbeResult> {
        let total = run.endpoints.len();
        if total == 0 {
            return Vec::new();
        }

        // A limit too large to represent as an instant means no deadline.
        let deadline = run
            .probe
            .run_timeout
            .and_then(|limit| tokio::time::Instant::now().checked_add(limit));
        let admission = Arc::new(Semaphore::new(
            run.probe.concurrency.clamp(1, total.min(Semaphore::MAX_PERMITS)),
        ));
        let (tx, mut rx) = mpsc::channel::<(usize, ProbeResult)>(total);
        let mut tasks = JoinSet::new();

        for index in 0..total {
            let run = Arc::clone(&run);
            let admission = Arc::clone(&admission);
            let prober = Arc::clone(&self.prober);
            let metrics = self.metrics.clone();
            let tx = tx.clone();

            tasks.spawn(async move {
                let endpoint = &run.endpoints[index];

                let unit = async {
                    let Ok(_permit) = admission.acquire().await else {
                        return ProbeResult::unavailable(&endpoint.url);
                    };
                    // Admitted after the deadline passed: do not start.
                    if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                        return ProbeResult::unavailable(&endpoint.url);
                    }
                    let _in_flight = metrics.probe_started();
                    let started = Instant::now();

                    let result = prober.probe(endpoint, &run.probe).await;

                    metrics.record_probe(result.status, started.elapsed());
                    result
                };

                let result = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, unit).await {
                        Ok(result) => result,
                        Err(_) => {
                            debug!(url = %endpoint.url, "run deadline reached before probe finished");
                            ProbeResult::unavailable(&endpoint.url)
                        }
                    },
                    None => unit.await,
                };

                // The collector outlives every sender, so this cannot fail.
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<ProbeResult>> = vec![None; total];
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "probe task did not complete");
            }
        }

        slots
            .into_iter()
            .zip(run.endpoints.iter())
            .map(|(slot, endpoint)| {
                slot.unwrap_or_else(|| ProbeResult::unavailable(&endpoint.url))
            })
            .collect()
    }
}
