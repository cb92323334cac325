//! Route dispatcher running the fixed filter chain

use axum::{
    body::Body,
    http::{Request, Uri},
    response::{IntoResponse, Response},
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::context::{headers, RequestContext};
use super::forward::Forwarder;
use super::route::{strip_segments, FilterKind, RouteTable};
use crate::error::{GatewayError, Result};
use crate::middleware::{AuthFilter, RateLimitFilter, TenantFilter};
use crate::observability::MetricsCollector;

/// Edge gateway: route match, filter chain, forward
///
/// Shared read-only by every request task.
pub struct Gateway {
    routes: Arc<RouteTable>,
    rate_limit: RateLimitFilter,
    tenant: TenantFilter,
    auth: AuthFilter,
    forwarder: Arc<dyn Forwarder>,
    trust_forwarded_for: bool,
    metrics: Arc<MetricsCollector>,
}

impl Gateway {
    pub fn new(
        routes: Arc<RouteTable>,
        rate_limit: RateLimitFilter,
        tenant: TenantFilter,
        auth: AuthFilter,
        forwarder: Arc<dyn Forwarder>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            routes,
            rate_limit,
            tenant,
            auth,
            forwarder,
            trust_forwarded_for: false,
            metrics,
        }
    }

    /// Take the first `X-Forwarded-For` entry as the client address
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handle one inbound request, rendering any rejection as a response
    pub async fn handle(&self, request: Request<Body>, peer: Option<IpAddr>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = match self.dispatch(request, peer).await {
            Ok(response) => {
                self.metrics.record_forwarded();
                response
            }
            Err(e) => {
                self.record_rejection(&e);
                info!(method = %method, path = %path, status = e.status_code().as_u16(), error = %e, "Request rejected");
                e.into_response()
            }
        };

        self.metrics.record_request(start.elapsed());
        response
    }

    /// Match, filter, rewrite and forward
    pub async fn dispatch(&self, request: Request<Body>, peer: Option<IpAddr>) -> Result<Response> {
        let path = request.uri().path().to_string();
        let route = self
            .routes
            .match_path(&path)
            .ok_or_else(|| GatewayError::RouteNotMatched(path.clone()))?;

        let client_addr = self.client_addr(&request, peer);
        let mut ctx = RequestContext::new(request, client_addr);

        for filter in route.filter_order() {
            match filter {
                FilterKind::RateLimit => self.rate_limit.apply(&mut ctx).await?,
                FilterKind::Tenant => self.tenant.apply(&mut ctx).await?,
                FilterKind::Auth => self.auth.apply(&mut ctx).await?,
            }
        }

        let mut request = ctx.into_request();
        if route.strip_prefix() > 0 {
            *request.uri_mut() = rewrite_uri(request.uri(), route.strip_prefix())?;
        }

        debug!(route = route.id(), backend = route.backend(), path = %request.uri().path(), "Filter chain passed");
        self.forwarder.forward(route.backend(), request).await
    }

    fn client_addr(&self, request: &Request<Body>, peer: Option<IpAddr>) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get(headers::FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        peer
    }

    fn record_rejection(&self, error: &GatewayError) {
        match error {
            GatewayError::CredentialMissing | GatewayError::CredentialInvalid(_) => {
                self.metrics.record_unauthorized()
            }
            GatewayError::RateLimitExceeded { .. } => self.metrics.record_rate_limited(),
            GatewayError::RouteNotMatched(_) => self.metrics.record_not_found(),
            GatewayError::BackendUnreachable(_) => self.metrics.record_backend_error(),
            _ => self.metrics.record_error(),
        }
    }
}

/// Drop leading path segments, keeping the query string
fn rewrite_uri(uri: &Uri, strip: usize) -> Result<Uri> {
    let path = strip_segments(uri.path(), strip);
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };
    path_and_query
        .parse::<Uri>()
        .map_err(|e| GatewayError::Internal(format!("invalid rewritten uri: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_uri_keeps_query() {
        let uri: Uri = "/api/v1/visitors/7?expand=true".parse().unwrap();
        assert_eq!(rewrite_uri(&uri, 2).unwrap().to_string(), "/visitors/7?expand=true");

        let uri: Uri = "/api/v1".parse().unwrap();
        assert_eq!(rewrite_uri(&uri, 2).unwrap().to_string(), "/");
    }
}
