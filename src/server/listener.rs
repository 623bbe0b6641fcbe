//! HTTP listener serving the health verdict.
//!
//! Routes:
//! - `GET /health` - run one aggregation and report it
//! - `GET /metrics` - Prometheus metrics

use crate::health::{AggregateVerdict, HealthService, Probe, RunError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Errors starting the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
}

/// HTTP listener that answers health requests.
pub struct HealthServer<P> {
    /// Bound TCP listener.
    listener: TcpListener,
    /// Pipeline invoked for each `/health` request.
    service: Arc<HealthService<P>>,
}

impl<P: Probe> HealthServer<P> {
    /// Bind the listener.
    pub async fn bind(address: SocketAddr, service: Arc<HealthService<P>>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind(address, e))?;

        Ok(Self { listener, service })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the server, accepting connections until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        match self.listener.local_addr() {
            Ok(address) => info!(address = %address, "health server started"),
            Err(e) => error!(error = %e, "failed to read bound address"),
        }

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, client)) => {
                            let service = Arc::clone(&self.service);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let handler = service_fn(move |req| {
                                    let service = Arc::clone(&service);
                                    async move { handle_request(req, &service).await }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, handler)
                                    .await
                                {
                                    debug!(client = %client, error = %e, "connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("health server shutting down");
                    break;
                }
            }
        }
    }
}

/// Handle an incoming request.
async fn handle_request<P: Probe>(
    req: Request<hyper::body::Incoming>,
    service: &HealthService<P>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();
    let method = req.method();

    debug!(path = %path, method = %method, "request");

    if method != Method::GET {
        return Ok(text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n"));
    }

    let response = match path {
        "/health" => health_response(service.run().await),
        "/metrics" => {
            let mut buffer = String::new();
            match encode(&mut buffer, service.metrics().registry()) {
                Ok(()) => Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
                    .body(Full::new(Bytes::from(buffer))),
                Err(e) => {
                    error!(error = %e, "failed to encode metrics");
                    return Ok(text_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to encode metrics\n",
                    ));
                }
            }
        }
        _ => return Ok(text_response(StatusCode::NOT_FOUND, "Not found\n")),
    };

    Ok(response.unwrap_or_else(|e| {
        error!(error = %e, "failed to build response");
        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error\n")
    }))
}

/// Map a run result to its HTTP response.
///
/// Healthy is 200 with every result, degraded is 424 with the failures only,
/// and a run that could not start is 500 with an error body.
fn health_response(
    run: Result<AggregateVerdict, RunError>,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let (status, body) = match run {
        Ok(verdict) => {
            let status = if verdict.is_healthy() {
                StatusCode::OK
            } else {
                StatusCode::FAILED_DEPENDENCY
            };
            (status, serde_json::to_vec(verdict.reported()))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::to_vec(&json!({ "error": e.to_string() })),
        ),
    };

    match body {
        Ok(body) => Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body))),
        Err(e) => {
            error!(error = %e, "failed to serialize health response");
            Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error\n"))
        }
    }
}

/// Create a plain-text response.
fn text_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, ProbeConfig};
    use crate::health::{ProbeResult, aggregate};
    use http_body_util::BodyExt;
    use hyper::header::HeaderValue;
    use std::time::Duration;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn accepted() -> ProbeConfig {
        ProbeConfig {
            user_agent: HeaderValue::from_static("test"),
            timeout: Duration::from_secs(1),
            concurrency: 1,
            accepted_statuses: [200].into_iter().collect(),
            run_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_healthy_response() {
        let verdict = aggregate(
            vec![ProbeResult::new("http://a/", 200), ProbeResult::new("http://b/", 200)],
            &accepted(),
        );
        let response = health_response(Ok(verdict)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_degraded_response_lists_failures_only() {
        let verdict = aggregate(
            vec![ProbeResult::new("http://a/", 200), ProbeResult::new("http://b/", 500)],
            &accepted(),
        );
        let response = health_response(Ok(verdict)).unwrap();

        assert_eq!(response.status(), StatusCode::FAILED_DEPENDENCY);
        assert_eq!(
            body_string(response).await,
            r#"[{"url":"http://b/","response_code":500}]"#
        );
    }

    #[tokio::test]
    async fn test_config_error_response() {
        let error = RunError::Config(ConfigError::ValidationError("no good".to_string()));
        let response = health_response(Err(error)).unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("no good"));
    }

    #[test]
    fn test_text_response() {
        let response = text_response(StatusCode::NOT_FOUND, "Not found\n");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
