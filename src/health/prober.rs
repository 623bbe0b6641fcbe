//! Single-endpoint HTTP probe.
//!
//! A probe never fails: transport errors and timeouts collapse into the
//! synthetic [`UNAVAILABLE_STATUS`] result.

use crate::config::{Endpoint, ProbeConfig};
use reqwest::header::{HOST, USER_AGENT};
use reqwest::{Client, Request};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Status reported when no HTTP response was obtained.
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    #[serde(rename = "response_code")]
    pub status: u16,
}

impl ProbeResult {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
        }
    }

    /// Synthetic result for a transport-level failure.
    pub fn unavailable(url: impl Into<String>) -> Self {
        Self::new(url, UNAVAILABLE_STATUS)
    }
}

/// Executes one health request against one endpoint.
pub trait Probe: Send + Sync + 'static {
    fn probe(
        &self,
        endpoint: &Endpoint,
        config: &ProbeConfig,
    ) -> impl Future<Output = ProbeResult> + Send;
}

/// HTTP and HTTPS prober built on a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    /// Create a new prober.
    ///
    /// The client keeps no idle connections, so every socket is closed as
    /// soon as its probe finishes.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_max_idle_per_host(0)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }

    /// Build the GET request for an endpoint.
    fn build_request(&self, endpoint: &Endpoint, config: &ProbeConfig) -> reqwest::Result<Request> {
        let mut builder = self
            .client
            .get(endpoint.target.clone())
            .header(USER_AGENT, config.user_agent.clone());

        if let Some(host) = &endpoint.host {
            builder = builder.header(HOST, host.clone());
        }

        builder.build()
    }
}

impl Probe for HttpProber {
    async fn probe(&self, endpoint: &Endpoint, config: &ProbeConfig) -> ProbeResult {
        let request = match self.build_request(endpoint, config) {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %endpoint.url, error = %e, "failed to build probe request");
                return ProbeResult::unavailable(&endpoint.url);
            }
        };

        match timeout(config.timeout, self.client.execute(request)).await {
            // The body is dropped unread, which closes the connection.
            Ok(Ok(response)) => ProbeResult::new(&endpoint.url, response.status().as_u16()),
            Ok(Err(e)) => {
                debug!(url = %endpoint.url, error = %e, "probe transport error");
                ProbeResult::unavailable(&endpoint.url)
            }
            Err(_) => {
                debug!(
                    url = %endpoint.url,
                    timeout_ms = config.timeout.as_millis(),
                    "probe timed out"
                );
                ProbeResult::unavailable(&endpoint.url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn probe_config(timeout: Duration) -> ProbeConfig {
        ProbeConfig {
            user_agent: HeaderValue::from_static("healthgate-test"),
            timeout,
            concurrency: 1,
            accepted_statuses: [200].into_iter().collect(),
            run_timeout: None,
        }
    }

    fn endpoint(url: &str, host: Option<&'static str>) -> Endpoint {
        Endpoint {
            url: url.to_string(),
            target: url.parse().unwrap(),
            host: host.map(HeaderValue::from_static),
        }
    }

    /// Accepts one connection, answers with `status`, and returns the raw request.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{}/health", addr), handle)
    }

    #[test]
    fn test_build_request_headers() {
        let endpoint = endpoint("http://10.0.0.1:8080/status", Some("api.example.com"));
        let request = HttpProber::new()
            .unwrap()
            .build_request(&endpoint, &probe_config(Duration::from_secs(1)))
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(request.url().as_str(), "http://10.0.0.1:8080/status");
        assert_eq!(request.headers()[HOST], "api.example.com");
        assert_eq!(request.headers()[USER_AGENT], "healthgate-test");
    }

    #[test]
    fn test_build_request_without_host_override() {
        let endpoint = endpoint("http://10.0.0.1:8080/status", None);
        let request = HttpProber::new()
            .unwrap()
            .build_request(&endpoint, &probe_config(Duration::from_secs(1)))
            .unwrap();
        assert!(request.headers().get(HOST).is_none());
    }

    #[tokio::test]
    async fn test_probe_passes_status_through() {
        let (url, server) = one_shot_server("500 Internal Server Error").await;
        let prober = HttpProber::new().unwrap();

        let result = prober
            .probe(&endpoint(&url, Some("svc.local")), &probe_config(Duration::from_secs(5)))
            .await;

        assert_eq!(result, ProbeResult::new(&url, 500));

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /health http/1.1"));
        assert!(request.contains("host: svc.local"));
        assert!(request.contains("user-agent: healthgate-test"));
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/", addr);
        let result = HttpProber::new()
            .unwrap()
            .probe(&endpoint(&url, None), &probe_config(Duration::from_secs(2)))
            .await;

        assert_eq!(result, ProbeResult::unavailable(&url));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let url = format!("http://{}/", addr);
        let started = std::time::Instant::now();
        let result = HttpProber::new()
            .unwrap()
            .probe(&endpoint(&url, None), &probe_config(Duration::from_millis(200)))
            .await;

        assert_eq!(result.status, UNAVAILABLE_STATUS);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_probe_tls_handshake_failure() {
        // A plain-HTTP server behind an https URL cannot complete a handshake.
        let (url, _server) = one_shot_server("200 OK").await;
        let url = url.replacen("http://", "https://", 1);

        let result = HttpProber::new()
            .unwrap()
            .probe(&endpoint(&url, None), &probe_config(Duration::from_secs(5)))
            .await;

        assert_eq!(result, ProbeResult::unavailable(&url));
    }

    #[test]
    fn test_probe_result_json() {
        let json = serde_json::to_string(&ProbeResult::new("http://a/", 200)).unwrap();
        assert_eq!(json, r#"{"url":"http://a/","response_code":200}"#);
    }
}
