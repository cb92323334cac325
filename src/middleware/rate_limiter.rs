//! Rate limiting filter

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, Result};
use crate::gateway::RequestContext;
use crate::observability::MetricsCollector;
use crate::rate_limit::{AcquireOutcome, RateLimitKey, RateLimiter};

/// First stage of the chain
///
/// Keys on the authenticated user when an earlier stage established one,
/// otherwise on the caller's address. A store outage fails open.
pub struct RateLimitFilter {
    limiter: Arc<RateLimiter>,
    config: RateLimitConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RateLimitFilter {
    pub fn new(limiter: Arc<RateLimiter>, config: RateLimitConfig) -> Self {
        Self {
            limiter,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Derive the limiting key for a request
    pub fn key_for(ctx: &RequestContext) -> RateLimitKey {
        match &ctx.identity {
            Some(identity) => RateLimitKey::User(identity.user_id.clone()),
            None => RateLimitKey::Ip(
                ctx.client_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        }
    }

    pub async fn apply(&self, ctx: &mut RequestContext) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let key = Self::key_for(ctx);
        let outcome = self
            .limiter
            .try_acquire(&key, self.config.limit, self.config.window_secs)
            .await;
        ctx.rate_limit_key = Some(key);

        match outcome {
            AcquireOutcome::Allowed { .. } => Ok(()),
            AcquireOutcome::Denied => Err(GatewayError::RateLimitExceeded {
                limit: self.config.limit,
                retry_after_secs: self.config.window_secs,
            }),
            AcquireOutcome::StoreUnavailable => {
                warn!(path = %ctx.path(), "Rate limit store unavailable, failing open");
                if let Some(metrics) = &self.metrics {
                    metrics.record_rate_limit_degraded();
                }
                debug!("Request admitted without rate limiting");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::context::Identity;
    use crate::rate_limit::{
        testing::{FailingStore, StallingStore},
        InMemoryRateLimitStore,
    };
    use axum::{body::Body, http::Request};
    use std::net::IpAddr;
    use std::time::Duration;

    fn ctx(addr: &str) -> RequestContext {
        let request = Request::builder()
            .uri("/api/v1/visitors")
            .body(Body::empty())
            .unwrap();
        RequestContext::new(request, Some(addr.parse::<IpAddr>().unwrap()))
    }

    fn config(limit: u64) -> RateLimitConfig {
        RateLimitConfig {
            limit,
            window_secs: 60,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_with_limit_and_window() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), "rl:"));
        let filter = RateLimitFilter::new(limiter, config(2));

        assert!(filter.apply(&mut ctx("10.0.0.1")).await.is_ok());
        assert!(filter.apply(&mut ctx("10.0.0.1")).await.is_ok());

        match filter.apply(&mut ctx("10.0.0.1")).await {
            Err(GatewayError::RateLimitExceeded { limit, retry_after_secs }) => {
                assert_eq!(limit, 2);
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }

        // other callers are unaffected
        assert!(filter.apply(&mut ctx("10.0.0.2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_fails_open_when_store_down() {
        let metrics = Arc::new(MetricsCollector::new());
        let limiter = Arc::new(RateLimiter::new(Arc::new(FailingStore), "rl:"));
        let filter = RateLimitFilter::new(limiter, config(1)).with_metrics(metrics.clone());

        for _ in 0..10 {
            assert!(filter.apply(&mut ctx("10.0.0.1")).await.is_ok());
        }
        assert_eq!(metrics.get_metrics().rate_limit_degraded, 10);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_stalls() {
        let metrics = Arc::new(MetricsCollector::new());
        let limiter = Arc::new(
            RateLimiter::new(Arc::new(StallingStore), "rl:").with_store_timeout(Duration::from_millis(20)),
        );
        let filter = RateLimitFilter::new(limiter, config(1)).with_metrics(metrics.clone());

        let result = tokio::time::timeout(Duration::from_secs(2), filter.apply(&mut ctx("10.0.0.1"))).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(metrics.get_metrics().rate_limit_degraded, 1);
    }

    #[tokio::test]
    async fn test_disabled_skips_store() {
        let limiter = Arc::new(RateLimiter::new(Arc::new(FailingStore), "rl:"));
        let filter = RateLimitFilter::new(
            limiter,
            RateLimitConfig {
                enabled: false,
                ..config(1)
            },
        );

        let mut ctx = ctx("10.0.0.1");
        assert!(filter.apply(&mut ctx).await.is_ok());
        assert!(ctx.rate_limit_key.is_none());
    }

    #[test]
    fn test_key_prefers_identity() {
        let mut ctx = ctx("10.0.0.1");
        assert_eq!(RateLimitFilter::key_for(&ctx), RateLimitKey::Ip("10.0.0.1".into()));

        ctx.identity = Some(Identity {
            user_id: "u-9".into(),
            email: None,
            role: None,
            tenant_id: None,
        });
        assert_eq!(RateLimitFilter::key_for(&ctx), RateLimitKey::User("u-9".into()));
    }
}
