//! Tenant resolution

use axum::http::{header, HeaderValue};
use std::net::IpAddr;
use tracing::debug;

use crate::error::Result;
use crate::gateway::context::headers;
use crate::gateway::RequestContext;

/// Host labels that never name a tenant
const RESERVED_SUBDOMAINS: [&str; 3] = ["www", "api", "app"];

/// Derives a tenant id from request metadata
///
/// Priority: `X-Tenant-Id` header, then host subdomain, then the path segment
/// after `/society/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantResolver;

impl TenantResolver {
    pub fn resolve(&self, ctx: &RequestContext) -> Option<String> {
        if let Some(tenant) = ctx.header_str(headers::TENANT_ID) {
            return Some(tenant.to_string());
        }

        if let Some(tenant) = ctx.header_str(header::HOST.as_str()).and_then(subdomain_tenant) {
            return Some(tenant);
        }

        path_tenant(ctx.path())
    }
}

fn subdomain_tenant(host: &str) -> Option<String> {
    // addresses are not hostnames
    let hostname = host.rsplit_once(':').map_or(host, |(name, _)| name);
    if hostname.parse::<IpAddr>().is_ok() || hostname.starts_with('[') {
        return None;
    }

    let (label, _) = host.split_once('.')?;
    if label.is_empty() || RESERVED_SUBDOMAINS.contains(&label) {
        return None;
    }
    Some(label.to_string())
}

fn path_tenant(path: &str) -> Option<String> {
    let mut segments = path.split('/');
    while let Some(segment) = segments.next() {
        if segment == "society" {
            return segments
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
    }
    None
}

/// Second stage of the chain; never rejects
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantFilter {
    resolver: TenantResolver,
}

impl TenantFilter {
    pub fn new(resolver: TenantResolver) -> Self {
        Self { resolver }
    }

    pub async fn apply(&self, ctx: &mut RequestContext) -> Result<()> {
        let Some(tenant) = self.resolver.resolve(ctx) else {
            return Ok(());
        };

        match HeaderValue::from_str(&tenant) {
            Ok(value) => {
                debug!(tenant_id = %tenant, "Tenant identified");
                ctx.set_header(headers::TENANT_ID, value);
                ctx.tenant_id = Some(tenant);
            }
            Err(_) => debug!("Ignoring tenant id that is not a valid header value"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn ctx(path: &str, host: Option<&str>, tenant: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().uri(path);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        if let Some(tenant) = tenant {
            builder = builder.header(headers::TENANT_ID, tenant);
        }
        RequestContext::new(builder.body(Body::empty()).unwrap(), None)
    }

    #[test]
    fn test_header_wins() {
        let ctx = ctx("/api/v1/society/xyz/visitors", Some("acme.example.com"), Some("globex"));
        assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("globex"));
    }

    #[test]
    fn test_subdomain() {
        let ctx = ctx("/api/v1/visitors", Some("acme.example.com"), None);
        assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("acme"));

        let ctx = self::ctx("/api/v1/visitors", Some("acme.example.com:8443"), None);
        assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("acme"));
    }

    #[test]
    fn test_subdomain_beats_path() {
        let ctx = ctx("/api/v1/society/xyz/visitors", Some("acme.example.com"), None);
        assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("acme"));
    }

    #[test]
    fn test_reserved_subdomains_skipped() {
        for host in ["www.example.com", "api.example.com", "app.example.com"] {
            let ctx = ctx("/api/v1/society/xyz/visitors", Some(host), None);
            assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("xyz"), "host {}", host);
        }
    }

    #[test]
    fn test_path_segment() {
        let ctx = ctx("/api/v1/society/xyz/notices", None, None);
        assert_eq!(TenantResolver.resolve(&ctx).as_deref(), Some("xyz"));

        let ctx = self::ctx("/api/v1/society/", None, None);
        assert_eq!(TenantResolver.resolve(&ctx), None);

        let ctx = self::ctx("/api/v1/societyx/xyz", None, None);
        assert_eq!(TenantResolver.resolve(&ctx), None);
    }

    #[test]
    fn test_absent() {
        assert_eq!(TenantResolver.resolve(&ctx("/api/v1/auth/login", Some("localhost:8080"), None)), None);
        assert_eq!(TenantResolver.resolve(&ctx("/api/v1/visitors", Some("10.1.2.3:8080"), None)), None);
        assert_eq!(TenantResolver.resolve(&ctx("/api/v1/visitors", Some("  "), Some(""))), None);
    }

    #[tokio::test]
    async fn test_filter_sets_header() {
        let mut ctx = ctx("/api/v1/visitors", Some("acme.example.com"), None);
        TenantFilter::default().apply(&mut ctx).await.unwrap();

        assert_eq!(ctx.tenant_id.as_deref(), Some("acme"));
        assert_eq!(ctx.header_str(headers::TENANT_ID), Some("acme"));
    }

    #[tokio::test]
    async fn test_filter_passes_untenanted() {
        let mut ctx = ctx("/api/v1/auth/login", None, None);
        TenantFilter::default().apply(&mut ctx).await.unwrap();

        assert!(ctx.tenant_id.is_none());
        assert!(ctx.headers().get(headers::TENANT_ID).is_none());
    }
}
