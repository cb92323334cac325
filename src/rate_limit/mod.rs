//! Distributed fixed-window rate limiting
//!
//! All counter mutation goes through [`RateLimitStore::acquire`], a single
//! atomic check-and-increment against the shared store.

pub mod memory_store;
pub mod redis_store;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::observability::MetricsCollector;

pub use memory_store::InMemoryRateLimitStore;
pub use redis_store::{LazyRedis, RedisRateLimitStore};

/// Rate limit store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("atomic acquire failed: {0}")]
    Script(String),

    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for RateLimitStoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            RateLimitStoreError::Connection(err.to_string())
        } else {
            RateLimitStoreError::Script(err.to_string())
        }
    }
}

/// Decision returned by the store for one acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDecision {
    /// Counter incremented (or created) to `count`
    Allowed { count: u64 },
    /// Counter already at the limit; not incremented
    Denied { count: u64 },
}

/// Shared counter store
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically: create the counter at 1 with a `window_secs` TTL if absent,
    /// increment it if below `limit`, otherwise leave it untouched and deny.
    async fn acquire(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<StoreDecision, RateLimitStoreError>;

    /// Liveness probe for health checks
    async fn ping(&self) -> Result<(), RateLimitStoreError>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// Outcome of [`RateLimiter::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Allowed { count: u64 },
    Denied,
    StoreUnavailable,
}

/// Limiting key; user and ip namespaces never collide
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    User(String),
    Ip(String),
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::User(id) => write!(f, "user:{}", id),
            RateLimitKey::Ip(addr) => write!(f, "ip:{}", addr),
        }
    }
}

/// Default bound on a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Rate limiter over a shared store
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    key_prefix: String,
    store_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(store: Arc<dyn RateLimitStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            metrics: None,
        }
    }

    /// Bound each store call; a store that does not answer in time counts
    /// as unavailable
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Record store latency into a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Underlying store
    pub fn store(&self) -> Arc<dyn RateLimitStore> {
        self.store.clone()
    }

    /// Try to take one request slot for `key` in the current window
    pub async fn try_acquire(&self, key: &RateLimitKey, limit: u64, window_secs: u64) -> AcquireOutcome {
        let store_key = format!("{}{}", self.key_prefix, key);
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.store_timeout,
            self.store.acquire(&store_key, limit, window_secs),
        )
        .await
        .unwrap_or(Err(RateLimitStoreError::Timeout(self.store_timeout)));

        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limit_latency(start.elapsed());
        }

        match result {
            Ok(StoreDecision::Allowed { count }) => {
                debug!(key = %store_key, count, limit, "Request allowed");
                AcquireOutcome::Allowed { count }
            }
            Ok(StoreDecision::Denied { count }) => {
                warn!(key = %store_key, count, limit, "Rate limit exceeded");
                AcquireOutcome::Denied
            }
            Err(e) => {
                warn!(
                    key = %store_key,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Rate limit store error"
                );
                AcquireOutcome::StoreUnavailable
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Store that fails every call
    pub struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        async fn acquire(&self, _: &str, _: u64, _: u64) -> Result<StoreDecision, RateLimitStoreError> {
            Err(RateLimitStoreError::Connection("connection refused".to_string()))
        }

        async fn ping(&self) -> Result<(), RateLimitStoreError> {
            Err(RateLimitStoreError::Connection("connection refused".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    /// Store that accepts calls and never answers
    pub struct StallingStore;

    #[async_trait]
    impl RateLimitStore for StallingStore {
        async fn acquire(&self, _: &str, _: u64, _: u64) -> Result<StoreDecision, RateLimitStoreError> {
            std::future::pending().await
        }

        async fn ping(&self) -> Result<(), RateLimitStoreError> {
            std::future::pending().await
        }

        fn backend_name(&self) -> &'static str {
            "stalling"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_key_namespaces() {
        assert_eq!(RateLimitKey::User("42".into()).to_string(), "user:42");
        assert_eq!(RateLimitKey::Ip("10.0.0.1".into()).to_string(), "ip:10.0.0.1");
        assert_ne!(
            RateLimitKey::User("1.2.3.4".into()).to_string(),
            RateLimitKey::Ip("1.2.3.4".into()).to_string()
        );
    }

    #[tokio::test]
    async fn test_first_acquire_allowed() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let limiter = RateLimiter::new(store.clone(), "rate_limit:");
        let key = RateLimitKey::Ip("10.0.0.1".into());

        assert_eq!(
            limiter.try_acquire(&key, 3, 60).await,
            AcquireOutcome::Allowed { count: 1 }
        );
        let (count, ttl) = store.snapshot("rate_limit:ip:10.0.0.1").unwrap();
        assert_eq!(count, 1);
        assert!(ttl.as_secs() <= 60 && ttl.as_secs() >= 59);
    }

    #[tokio::test]
    async fn test_denied_after_limit() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), "rl:");
        let key = RateLimitKey::User("u-1".into());

        for i in 1..=3 {
            assert_eq!(
                limiter.try_acquire(&key, 3, 60).await,
                AcquireOutcome::Allowed { count: i }
            );
        }
        assert_eq!(limiter.try_acquire(&key, 3, 60).await, AcquireOutcome::Denied);
        assert_eq!(limiter.try_acquire(&key, 3, 60).await, AcquireOutcome::Denied);
    }

    #[tokio::test]
    async fn test_store_failure_reported() {
        let limiter = RateLimiter::new(Arc::new(testing::FailingStore), "rl:");
        let key = RateLimitKey::Ip("10.0.0.1".into());

        assert_eq!(
            limiter.try_acquire(&key, 3, 60).await,
            AcquireOutcome::StoreUnavailable
        );
    }

    #[tokio::test]
    async fn test_stalled_store_times_out_as_unavailable() {
        let limiter = RateLimiter::new(Arc::new(testing::StallingStore), "rl:")
            .with_store_timeout(Duration::from_millis(50));
        let key = RateLimitKey::Ip("10.0.0.1".into());

        let start = Instant::now();
        assert_eq!(
            limiter.try_acquire(&key, 3, 60).await,
            AcquireOutcome::StoreUnavailable
        );
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_acquires_never_exceed_limit() {
        const LIMIT: u64 = 25;
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            "rl:",
        ));
        let allowed = Arc::new(AtomicU64::new(0));

        let tasks: Vec<_> = (0..400)
            .map(|_| {
                let limiter = limiter.clone();
                let allowed = allowed.clone();
                tokio::spawn(async move {
                    let key = RateLimitKey::User("shared".into());
                    if let AcquireOutcome::Allowed { .. } = limiter.try_acquire(&key, LIMIT, 60).await {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap();
        }

        assert_eq!(allowed.load(Ordering::SeqCst), LIMIT);
    }
}
