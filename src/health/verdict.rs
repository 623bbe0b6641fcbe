//! Classification of probe results into an overall verdict.

use crate::config::ProbeConfig;
use crate::health::ProbeResult;
use serde::Serialize;

/// Overall health of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Healthy,
    Degraded,
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateVerdict {
    pub outcome: Outcome,
    /// One result per endpoint.
    pub results: Vec<ProbeResult>,
    /// The results whose status is not on the allow-list.
    pub failed: Vec<ProbeResult>,
}

impl AggregateVerdict {
    pub fn is_healthy(&self) -> bool {
        self.outcome == Outcome::Healthy
    }

    /// The results a caller should see: everything when healthy, only the
    /// failures when degraded.
    pub fn reported(&self) -> &[ProbeResult] {
        match self.outcome {
            Outcome::Healthy => &self.results,
            Outcome::Degraded => &self.failed,
        }
    }
}

/// Partition `results` against the accepted statuses of `config`.
///
/// Acceptance is allow-list only: a status the config does not accept is a
/// failure even if it is in the 2xx range. The synthetic 503 is treated like
/// any other code. An empty result set is healthy.
pub fn aggregate(results: Vec<ProbeResult>, config: &ProbeConfig) -> AggregateVerdict {
    let failed: Vec<ProbeResult> = results
        .iter()
        .filter(|result| !config.accepts(result.status))
        .cloned()
        .collect();

    let outcome = if failed.is_empty() {
        Outcome::Healthy
    } else {
        Outcome::Degraded
    };

    AggregateVerdict {
        outcome,
        results,
        failed,
    }
}
