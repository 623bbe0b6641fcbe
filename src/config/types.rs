//! Configuration data types.
//!
//! [`AppConfig`] mirrors the file on disk. [`RunConfig`] is the validated form
//! handed to a single aggregation run.

use hyper::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Root configuration structure, as read from the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    /// User-Agent sent with every probe
    #[serde(default = "default_user_agent", alias = "user_agent")]
    pub user_agent: String,

    /// Per-probe timeout in seconds
    #[serde(default = "default_http_timeout", alias = "http_timeout")]
    pub http_timeout: u64,

    /// Response codes considered healthy
    #[serde(default = "default_accepted_statuses", alias = "accepted_statuses")]
    pub accepted_statuses: Vec<u16>,

    /// Maximum number of probes in flight at once
    #[serde(default = "default_concurrent_requests", alias = "concurrent_requests")]
    pub concurrent_requests: usize,

    /// Optional bound on the wall time of a whole run, in seconds
    #[serde(default, alias = "run_timeout")]
    pub run_timeout: Option<u64>,

    /// Endpoints to probe
    #[serde(default, alias = "endpoints")]
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            http_timeout: default_http_timeout(),
            accepted_statuses: default_accepted_statuses(),
            concurrent_requests: default_concurrent_requests(),
            run_timeout: None,
            endpoints: Vec::new(),
        }
    }
}

/// A single endpoint entry in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Absolute URL to probe
    #[serde(rename = "URL", alias = "url")]
    pub url: String,

    /// Value for the Host header; empty means "use the URL authority"
    #[serde(rename = "HeaderHost", alias = "header_host", default)]
    pub header_host: String,
}

/// Probe settings shared read-only by every probe of a run.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// User-Agent header value.
    pub user_agent: HeaderValue,
    /// Deadline for connect plus response head of a single probe.
    pub timeout: Duration,
    /// Admission limit for concurrent probes (always >= 1).
    pub concurrency: usize,
    /// Allow-list of healthy status codes.
    pub accepted_statuses: BTreeSet<u16>,
    /// Deadline for the whole run, if any.
    pub run_timeout: Option<Duration>,
}

impl ProbeConfig {
    /// Whether `status` is on the allow-list.
    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_statuses.contains(&status)
    }
}

/// A validated probe target.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// URL exactly as configured; reported back in results.
    pub url: String,
    /// Parsed request target (`http` or `https`).
    pub target: Url,
    /// Host header override.
    pub host: Option<HeaderValue>,
}

/// Everything one aggregation run needs, validated and immutable.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub probe: ProbeConfig,
    pub endpoints: Vec<Endpoint>,
}

// Default value functions
fn default_user_agent() -> String {
    concat!("healthgate/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_http_timeout() -> u64 {
    5
}

fn default_accepted_statuses() -> Vec<u16> {
    vec![200]
}

fn default_concurrent_requests() -> usize {
    8
}
