//! Revoked-token list consulted after a token verifies
//!
//! Logged-out tokens are blacklisted by the user service until their natural
//! expiry. The shared Redis list uses the user service's key layout,
//! `blacklist:<raw token>`; the process-local list keys by SHA-256 digest.

use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::rate_limit::LazyRedis;

/// Revocation list errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RevocationError {
    #[error("Revocation store error: {0}")]
    Store(String),

    #[error("Revocation lookup timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for RevocationError {
    fn from(err: redis::RedisError) -> Self {
        RevocationError::Store(err.to_string())
    }
}

/// Store of revoked tokens
#[async_trait]
pub trait TokenRevocationList: Send + Sync {
    /// Whether the token has been revoked
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError>;

    /// Revoke a token for `ttl` (normally its remaining lifetime)
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), RevocationError>;
}

/// Digest used as the process-local key for a token
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Redis-backed revocation list shared with the user service
pub struct RedisRevocationList {
    redis: Arc<LazyRedis>,
    key_prefix: String,
}

impl RedisRevocationList {
    pub fn new(redis: Arc<LazyRedis>) -> Self {
        Self {
            redis,
            key_prefix: "blacklist:".to_string(),
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, token)
    }
}

#[async_trait]
impl TokenRevocationList for RedisRevocationList {
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        let mut conn = self.redis.connection().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key(token))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), RevocationError> {
        let secs = ttl.as_secs().max(1);
        let mut conn = self.redis.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(token))
            .arg("true")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        debug!("Token revoked for {}s", secs);
        Ok(())
    }
}

/// Per-entry expiry: each revocation lives exactly as long as its ttl
struct RevocationExpiry;

impl Expiry<String, Duration> for RevocationExpiry {
    fn expire_after_create(&self, _key: &String, ttl: &Duration, _created_at: Instant) -> Option<Duration> {
        Some(*ttl)
    }
}

/// Process-local revocation list for single-node deployments and tests
pub struct InMemoryRevocationList {
    revoked: Cache<String, Duration>,
}

impl InMemoryRevocationList {
    pub fn new(max_entries: u64) -> Self {
        let revoked = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(RevocationExpiry)
            .build();
        Self { revoked }
    }
}

impl Default for InMemoryRevocationList {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl TokenRevocationList for InMemoryRevocationList {
    async fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        Ok(self.revoked.get(&token_digest(token)).await.is_some())
    }

    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), RevocationError> {
        self.revoked.insert(token_digest(token), ttl).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revoke_and_lookup() {
        let list = InMemoryRevocationList::default();

        assert!(!list.is_revoked("token-a").await.unwrap());
        list.revoke("token-a", Duration::from_secs(60)).await.unwrap();

        assert!(list.is_revoked("token-a").await.unwrap());
        assert!(!list.is_revoked("token-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_revocation_expires() {
        let list = InMemoryRevocationList::default();
        list.revoke("token-a", Duration::from_millis(50)).await.unwrap();
        assert!(list.is_revoked("token-a").await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!list.is_revoked("token-a").await.unwrap());
    }

    #[test]
    fn test_redis_key_matches_user_service_blacklist() {
        let list = RedisRevocationList::new(Arc::new(LazyRedis::open("redis://127.0.0.1:1").unwrap()));
        assert_eq!(list.key("eyJhbGciOiJIUzI1NiJ9.e30.sig"), "blacklist:eyJhbGciOiJIUzI1NiJ9.e30.sig");
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let digest = token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest("abc"));
        assert_ne!(digest, token_digest("abd"));
    }
}
