//! Configuration validation.

use crate::config::{AppConfig, Endpoint, EndpointConfig, ProbeConfig, RunConfig};
use hyper::header::HeaderValue;
use reqwest::Url;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Validate the configuration and build the [`RunConfig`] used by a run.
///
/// Checks for:
/// - Positive HTTP timeout and run timeout
/// - At least one concurrent request, and no more than a semaphore can admit
/// - Accepted statuses within the HTTP status range
/// - A valid User-Agent header value
/// - Endpoint URLs that parse as absolute `http://` or `https://` URLs with a host
/// - Valid Host header overrides
///
/// # Returns
///
/// The validated configuration, or an error message listing every problem.
pub fn validate_config(config: &AppConfig) -> Result<RunConfig, String> {
    let mut errors = Vec::new();

    if config.http_timeout == 0 {
        errors.push("HttpTimeout must be greater than 0".to_string());
    }

    if config.concurrent_requests == 0 {
        errors.push("ConcurrentRequests must be at least 1".to_string());
    } else if config.concurrent_requests > Semaphore::MAX_PERMITS {
        errors.push(format!(
            "ConcurrentRequests must be at most {}",
            Semaphore::MAX_PERMITS
        ));
    }

    if config.run_timeout == Some(0) {
        errors.push("RunTimeout must be greater than 0 when set".to_string());
    }

    for status in &config.accepted_statuses {
        if !(100..=999).contains(status) {
            errors.push(format!("accepted status {} is not a valid HTTP status", status));
        }
    }

    let user_agent = match HeaderValue::from_str(&config.user_agent) {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!("UserAgent '{}' is not a valid header value", config.user_agent));
            None
        }
    };

    let mut endpoints = Vec::with_capacity(config.endpoints.len());
    for endpoint in &config.endpoints {
        match validate_endpoint(endpoint) {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(e) => errors.push(e),
        }
    }

    match user_agent {
        Some(user_agent) if errors.is_empty() => Ok(RunConfig {
            probe: ProbeConfig {
                user_agent,
                timeout: Duration::from_secs(config.http_timeout),
                concurrency: config.concurrent_requests,
                accepted_statuses: config.accepted_statuses.iter().copied().collect(),
                run_timeout: config.run_timeout.map(Duration::from_secs),
            },
            endpoints,
        }),
        _ => Err(errors.join("; ")),
    }
}

/// Validate a single endpoint entry.
fn validate_endpoint(endpoint: &EndpointConfig) -> Result<Endpoint, String> {
    let target = Url::parse(&endpoint.url)
        .map_err(|e| format!("endpoint URL '{}' is invalid: {}", endpoint.url, e))?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(format!(
            "endpoint URL '{}' uses unsupported scheme '{}'",
            endpoint.url,
            target.scheme()
        ));
    }

    if target.host_str().is_none_or(str::is_empty) {
        return Err(format!("endpoint URL '{}' has no host", endpoint.url));
    }

    let host = if endpoint.header_host.is_empty() {
        None
    } else {
        let value = HeaderValue::from_str(&endpoint.header_host).map_err(|_| {
            format!(
                "HeaderHost '{}' for endpoint '{}' is not a valid header value",
                endpoint.header_host, endpoint.url
            )
        })?;
        Some(value)
    };

    Ok(Endpoint {
        url: endpoint.url.clone(),
        target,
        host,
    })
}
