//! Health checks for the gateway and its dependencies

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::rate_limit::RateLimitStore;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Overall system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
struct CachedHealth {
    result: SystemHealth,
    cached_at: Instant,
}

/// Health checker with caching
///
/// A failing rate-limit store only degrades the gateway: requests keep
/// flowing without limiting.
pub struct HealthChecker {
    start_time: Instant,
    rate_limit_store: Option<Arc<dyn RateLimitStore>>,
    route_count: usize,
    cached_result: RwLock<Option<CachedHealth>>,
    cache_ttl: Duration,
}

impl HealthChecker {
    /// Create a new health checker with a 10-second cache TTL
    pub fn new() -> Self {
        Self::with_cache_ttl(Duration::from_secs(10))
    }

    pub fn with_cache_ttl(cache_ttl: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            rate_limit_store: None,
            route_count: 0,
            cached_result: RwLock::new(None),
            cache_ttl,
        }
    }

    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    pub fn with_route_count(mut self, count: usize) -> Self {
        self.route_count = count;
        self
    }

    /// Check overall health, reusing a recent result
    pub async fn check_health(&self) -> SystemHealth {
        {
            let cached = self.cached_result.read().await;
            if let Some(cached) = &*cached {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    debug!("Returning cached health check result");
                    return cached.result.clone();
                }
            }
        }

        self.check_health_fresh().await
    }

    /// Run every probe and refresh the cache
    pub async fn check_health_fresh(&self) -> SystemHealth {
        let components = vec![self.check_rate_limit_store().await, self.check_route_table()];

        let status = if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if components.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        let health = SystemHealth {
            status,
            uptime_secs: self.start_time.elapsed().as_secs(),
            components,
            timestamp: chrono::Utc::now().timestamp(),
        };

        *self.cached_result.write().await = Some(CachedHealth {
            result: health.clone(),
            cached_at: Instant::now(),
        });

        health
    }

    async fn check_rate_limit_store(&self) -> ComponentHealth {
        let name = "rate_limit_store".to_string();
        let Some(store) = &self.rate_limit_store else {
            return ComponentHealth {
                name,
                status: HealthStatus::Healthy,
                message: Some("Rate limiting disabled".to_string()),
                response_time_ms: None,
            };
        };

        let start = Instant::now();
        let (status, message) = match tokio::time::timeout(PROBE_TIMEOUT, store.ping()).await {
            Ok(Ok(())) => (
                HealthStatus::Healthy,
                format!("{} store reachable", store.backend_name()),
            ),
            Ok(Err(e)) => {
                warn!(error = %e, "Rate limit store health probe failed");
                (
                    HealthStatus::Degraded,
                    format!("{} store unavailable, failing open", store.backend_name()),
                )
            }
            Err(_) => (
                HealthStatus::Degraded,
                format!("{} store probe timed out, failing open", store.backend_name()),
            ),
        };

        ComponentHealth {
            name,
            status,
            message: Some(message),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    fn check_route_table(&self) -> ComponentHealth {
        let (status, message) = if self.route_count == 0 {
            (HealthStatus::Unhealthy, "No routes configured".to_string())
        } else {
            (HealthStatus::Healthy, format!("{} routes loaded", self.route_count))
        };

        ComponentHealth {
            name: "route_table".to_string(),
            status,
            message: Some(message),
            response_time_ms: None,
        }
    }

    /// Simple liveness check
    pub fn liveness(&self) -> bool {
        true
    }

    /// Ready unless a component is unhealthy
    pub async fn readiness(&self) -> bool {
        self.check_health().await.status != HealthStatus::Unhealthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{testing::FailingStore, InMemoryRateLimitStore};

    #[tokio::test]
    async fn test_healthy_with_memory_store() {
        let checker = HealthChecker::new()
            .with_rate_limit_store(Arc::new(InMemoryRateLimitStore::new()))
            .with_route_count(8);
        let health = checker.check_health().await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.components.len(), 2);
    }

    #[tokio::test]
    async fn test_store_outage_degrades() {
        let checker = HealthChecker::new()
            .with_rate_limit_store(Arc::new(FailingStore))
            .with_route_count(8);

        assert_eq!(checker.check_health().await.status, HealthStatus::Degraded);
        assert!(checker.readiness().await);
    }

    #[tokio::test]
    async fn test_no_routes_is_unhealthy() {
        let checker = HealthChecker::new();
        assert_eq!(checker.check_health().await.status, HealthStatus::Unhealthy);
        assert!(!checker.readiness().await);
    }

    #[test]
    fn test_liveness() {
        assert!(HealthChecker::new().liveness());
    }
}
