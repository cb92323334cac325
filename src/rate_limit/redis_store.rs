//! Redis-backed counter store

use async_trait::async_trait;
use redis::{aio::ConnectionManager, ErrorKind, RedisError, RedisResult, Script};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{RateLimitStore, RateLimitStoreError, StoreDecision};

/// Atomic get-or-init-and-increment. Returns `{allowed, count}`.
const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

local current = redis.call('GET', key)
if current == false then
    redis.call('SET', key, 1, 'EX', window)
    return {1, 1}
end

current = tonumber(current)
if current >= limit then
    return {0, current}
end

return {1, redis.call('INCR', key)}
"#;

/// Upper bound on one connection attempt, including the manager's retries
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Quiet period after a failed connection attempt
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Redis connection opened on first use
///
/// Startup does not depend on Redis being reachable; until a connection
/// succeeds every call reports a connection error. After a failed attempt,
/// calls fail immediately until the backoff has passed.
pub struct LazyRedis {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    last_failure: Mutex<Option<Instant>>,
    retry_backoff: Duration,
}

impl LazyRedis {
    /// Parse the URL without connecting
    pub fn open(url: &str) -> RedisResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: OnceCell::new(),
            last_failure: Mutex::new(None),
            retry_backoff: RETRY_BACKOFF,
        })
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Shared multiplexed connection
    pub async fn connection(&self) -> RedisResult<ConnectionManager> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn.clone());
        }
        if self.backing_off() {
            return Err(RedisError::from((
                ErrorKind::IoError,
                "redis unreachable, waiting before reconnecting",
            )));
        }

        let result = self
            .conn
            .get_or_try_init(|| async {
                let manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| RedisError::from((ErrorKind::IoError, "connection attempt timed out")))??;
                info!("Connected to redis");
                Ok::<_, redis::RedisError>(manager)
            })
            .await;

        match result {
            Ok(conn) => Ok(conn.clone()),
            Err(e) => {
                warn!(error = %e, backoff = ?self.retry_backoff, "Redis connection failed");
                if let Ok(mut last_failure) = self.last_failure.lock() {
                    *last_failure = Some(Instant::now());
                }
                Err(e)
            }
        }
    }

    fn backing_off(&self) -> bool {
        self.last_failure
            .lock()
            .ok()
            .and_then(|last_failure| *last_failure)
            .is_some_and(|at| at.elapsed() < self.retry_backoff)
    }
}

/// Rate limit store running the acquire as one Lua script
pub struct RedisRateLimitStore {
    redis: std::sync::Arc<LazyRedis>,
    script: Script,
}

impl RedisRateLimitStore {
    pub fn new(redis: std::sync::Arc<LazyRedis>) -> Self {
        Self {
            redis,
            script: Script::new(ACQUIRE_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn acquire(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<StoreDecision, RateLimitStoreError> {
        let mut conn = self.redis.connection().await?;

        let (allowed, count): (i64, i64) = self
            .script
            .key(key)
            .arg(limit)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;

        let count = count.max(0) as u64;
        Ok(if allowed == 1 {
            StoreDecision::Allowed { count }
        } else {
            StoreDecision::Denied { count }
        })
    }

    async fn ping(&self) -> Result<(), RateLimitStoreError> {
        let mut conn = self.redis.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const REDIS_URL: &str = "redis://127.0.0.1:6379";

    async fn redis_store() -> Option<RedisRateLimitStore> {
        let store = RedisRateLimitStore::new(Arc::new(LazyRedis::open(REDIS_URL).ok()?));
        store.ping().await.ok()?;
        Some(store)
    }

    #[test]
    fn test_open_does_not_connect() {
        assert!(LazyRedis::open("redis://127.0.0.1:1").is_ok());
        assert!(LazyRedis::open("not a url").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_connection_error() {
        let store = RedisRateLimitStore::new(Arc::new(
            LazyRedis::open("redis://127.0.0.1:1").unwrap(),
        ));
        assert!(store.acquire("k", 10, 60).await.is_err());
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_connect_backs_off() {
        let redis = LazyRedis::open("redis://127.0.0.1:1").unwrap();
        assert!(redis.connection().await.is_err());

        let start = std::time::Instant::now();
        let err = redis.connection().await.err().unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(err.to_string().contains("waiting before reconnecting"));
    }

    #[tokio::test]
    async fn test_reconnects_after_backoff() {
        let redis = LazyRedis::open("redis://127.0.0.1:1")
            .unwrap()
            .with_retry_backoff(Duration::from_millis(10));
        assert!(redis.connection().await.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = redis.connection().await.err().unwrap();
        assert!(!err.to_string().contains("waiting before reconnecting"));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_redis_acquire_script() {
        let Some(store) = redis_store().await else {
            eprintln!("Skipping test: Redis not available at {}", REDIS_URL);
            return;
        };
        let key = format!("rate_limit:test:{}", uuid::Uuid::new_v4());

        assert_eq!(store.acquire(&key, 2, 60).await.unwrap(), StoreDecision::Allowed { count: 1 });
        assert_eq!(store.acquire(&key, 2, 60).await.unwrap(), StoreDecision::Allowed { count: 2 });
        assert_eq!(store.acquire(&key, 2, 60).await.unwrap(), StoreDecision::Denied { count: 2 });

        let mut conn = store.redis.connection().await.unwrap();
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);
    }
}
