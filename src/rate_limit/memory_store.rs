//! Process-local counter store
//!
//! Atomicity comes from DashMap's entry API: the shard holding a key stays
//! write-locked for the whole check-and-increment.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{RateLimitStore, RateLimitStoreError, StoreDecision};

#[derive(Debug, Clone)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

impl Counter {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            expires_at: now + window,
        }
    }
}

/// In-memory rate limit store
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    counters: DashMap<String, Counter>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count and remaining TTL for a live counter
    pub fn snapshot(&self, key: &str) -> Option<(u64, Duration)> {
        let now = Instant::now();
        self.counters.get(key).and_then(|counter| {
            (counter.expires_at > now).then(|| (counter.count, counter.expires_at - now))
        })
    }

    /// Number of tracked counters, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Drop counters whose window has ended
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, counter| counter.expires_at > now);
        debug!("Cleaned up expired rate limit counters");
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.cleanup_expired();
            }
        })
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn acquire(
        &self,
        key: &str,
        limit: u64,
        window_secs: u64,
    ) -> Result<StoreDecision, RateLimitStoreError> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let decision = match self.counters.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Counter::fresh(now, window));
                StoreDecision::Allowed { count: 1 }
            }
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if now >= counter.expires_at {
                    *counter = Counter::fresh(now, window);
                    StoreDecision::Allowed { count: 1 }
                } else if counter.count >= limit {
                    StoreDecision::Denied { count: counter.count }
                } else {
                    counter.count += 1;
                    StoreDecision::Allowed { count: counter.count }
                }
            }
        };

        Ok(decision)
    }

    async fn ping(&self) -> Result<(), RateLimitStoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_reset() {
        let store = InMemoryRateLimitStore::new();

        assert_eq!(store.acquire("k", 1, 1).await.unwrap(), StoreDecision::Allowed { count: 1 });
        assert_eq!(store.acquire("k", 1, 1).await.unwrap(), StoreDecision::Denied { count: 1 });

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(store.acquire("k", 1, 1).await.unwrap(), StoreDecision::Allowed { count: 1 });
    }

    #[tokio::test]
    async fn test_denied_does_not_increment() {
        let store = InMemoryRateLimitStore::new();
        store.acquire("k", 2, 60).await.unwrap();
        store.acquire("k", 2, 60).await.unwrap();

        for _ in 0..5 {
            store.acquire("k", 2, 60).await.unwrap();
        }
        assert_eq!(store.snapshot("k").unwrap().0, 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryRateLimitStore::new();
        store.acquire("a", 1, 60).await.unwrap();

        assert_eq!(store.acquire("a", 1, 60).await.unwrap(), StoreDecision::Denied { count: 1 });
        assert_eq!(store.acquire("b", 1, 60).await.unwrap(), StoreDecision::Allowed { count: 1 });
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = InMemoryRateLimitStore::new();
        store.acquire("short", 5, 1).await.unwrap();
        store.acquire("long", 5, 60).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        store.cleanup_expired();

        assert_eq!(store.len(), 1);
        assert!(store.snapshot("short").is_none());
        assert!(store.snapshot("long").is_some());
    }
}
