//! Backend location and request forwarding

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request},
    response::Response,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::context::{headers, ClientAddr};
use crate::error::{GatewayError, Result};
use crate::observability::MetricsCollector;

/// Resolves a backend name to a concrete base URL
#[async_trait]
pub trait BackendLocator: Send + Sync {
    async fn locate(&self, backend: &str) -> Result<String>;
}

/// Locator over a fixed name → base URL map
#[derive(Debug, Clone, Default)]
pub struct StaticBackendLocator {
    backends: HashMap<String, String>,
}

impl StaticBackendLocator {
    pub fn new(backends: HashMap<String, String>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl BackendLocator for StaticBackendLocator {
    async fn locate(&self, backend: &str) -> Result<String> {
        self.backends
            .get(backend)
            .cloned()
            .ok_or_else(|| GatewayError::BackendUnreachable(format!("no instance registered for {}", backend)))
    }
}

/// Sends a fully filtered request to its backend
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, backend: &str, request: Request<Body>) -> Result<Response>;
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP forwarder built on reqwest
pub struct HttpForwarder {
    client: reqwest::Client,
    locator: Arc<dyn BackendLocator>,
    max_body_bytes: usize,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HttpForwarder {
    pub fn new(locator: Arc<dyn BackendLocator>, timeout: Duration, max_body_bytes: usize) -> Result<Self> {
        // redirects go back to the client untouched
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            locator,
            max_body_bytes,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, backend: &str, request: Request<Body>) -> Result<Response> {
        let base = self.locator.locate(backend).await?;
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", base.trim_end_matches('/'), path_and_query);

        let body: Bytes = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to read request body: {}", e)))?;

        let mut outbound = parts.headers;
        strip_hop_by_hop(&mut outbound);
        outbound.remove(header::HOST);
        outbound.remove(header::CONTENT_LENGTH);
        if let Some(ClientAddr(addr)) = parts.extensions.get::<ClientAddr>() {
            let chain = match outbound.get(headers::FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{}, {}", existing, addr),
                None => addr.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                outbound.insert(headers::FORWARDED_FOR, value);
            }
        }

        debug!(backend, method = %parts.method, url = %url, "Forwarding request");

        let start = Instant::now();
        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(outbound)
            .body(body)
            .send()
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_latency(start.elapsed());
        }

        let upstream = upstream.map_err(|e| {
            warn!(backend, url = %url, error = %e, "Backend request failed");
            GatewayError::BackendUnreachable(format!("{}: {}", backend, e))
        })?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_locator() {
        let locator = StaticBackendLocator::new(HashMap::from([(
            "visitor-service".to_string(),
            "http://visitor-service:8080".to_string(),
        )]));

        assert_eq!(
            locator.locate("visitor-service").await.unwrap(),
            "http://visitor-service:8080"
        );
        assert!(matches!(
            locator.locate("unknown").await,
            Err(GatewayError::BackendUnreachable(_))
        ));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-user-id", HeaderValue::from_static("u-1"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-user-id"));
    }
}
