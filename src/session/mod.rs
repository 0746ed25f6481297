//! Session store: a key-value store with per-key TTL and atomic take.
//!
//! Holds the single live refresh token per principal (`refresh:{id}`) and
//! single-use exchange codes (`code:{uuid}`). Redis is the production backend;
//! the in-memory backend has the same atomicity and is used for tests and
//! single-instance deployments.

mod exchange_code;
mod memory;
mod redis_store;
mod refresh_token;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

pub use exchange_code::ExchangeCodeStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use refresh_token::RefreshTokenStore;

/// Infrastructure failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Redis(#[from] redis::RedisError),
}

#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryStore>),
    Redis(RedisStore),
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Backend,
}

impl SessionStore {
    /// In-process store reading expiry from `clock`.
    pub fn in_memory(clock: Clock) -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::new(clock))),
        }
    }

    /// Connect to Redis and verify it responds.
    pub async fn connect_redis(url: &str) -> Result<Self, StoreError> {
        let store = RedisStore::connect(url).await?;
        Ok(Self {
            backend: Backend::Redis(store),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_secs = ttl.as_secs().max(1);
        match &self.backend {
            Backend::Memory(store) => {
                store.put(key, value, ttl_secs);
                Ok(())
            }
            Backend::Redis(store) => Ok(store.put(key, value, ttl_secs).await?),
        }
    }

    /// Overwrite `key` with `value` only if its live value is `expected`.
    /// Returns whether the swap happened. Atomic on both backends.
    pub async fn replace_if_current(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let ttl_secs = ttl.as_secs().max(1);
        match &self.backend {
            Backend::Memory(store) => Ok(store.replace_if_current(key, expected, value, ttl_secs)),
            Backend::Redis(store) => Ok(store
                .replace_if_current(key, expected, value, ttl_secs)
                .await?),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get(key)),
            Backend::Redis(store) => Ok(store.get(key).await?),
        }
    }

    /// Remove `key`. Returns whether a live entry was removed.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.delete(key)),
            Backend::Redis(store) => Ok(store.delete(key).await?),
        }
    }

    /// Read and remove `key` in one atomic step. At most one caller ever
    /// observes a given value.
    pub async fn get_and_delete(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_and_delete(key)),
            Backend::Redis(store) => Ok(store.get_and_delete(key).await?),
        }
    }

    /// Drop expired entries from the memory backend. Redis expires keys itself.
    pub fn purge_expired(&self) -> usize {
        match &self.backend {
            Backend::Memory(store) => store.purge_expired(),
            Backend::Redis(_) => 0,
        }
    }

    /// Get the refresh token store.
    pub fn refresh_tokens(&self) -> RefreshTokenStore<'_> {
        RefreshTokenStore::new(self)
    }

    /// Get the exchange code store.
    pub fn exchange_codes(&self) -> ExchangeCodeStore<'_> {
        ExchangeCodeStore::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SessionStore::in_memory(Clock::manual(0));

        store.put("k", "one", Duration::from_secs(10)).await.unwrap();
        store.put("k", "two", Duration::from_secs(10)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_clamped() {
        let clock = Clock::manual(0);
        let store = SessionStore::in_memory(clock.clone());

        store.put("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());

        clock.advance(1);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_and_delete_is_single_use() {
        let store = SessionStore::in_memory(Clock::manual(0));
        store.put("k", "v", Duration::from_secs(10)).await.unwrap();

        assert_eq!(
            store.get_and_delete("k").await.unwrap().as_deref(),
            Some("v")
        );
        assert!(store.get_and_delete("k").await.unwrap().is_none());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_replace_has_one_winner() {
        let store = SessionStore::in_memory(Clock::manual(0));
        store.put("k", "v0", Duration::from_secs(10)).await.unwrap();

        let attempts = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .replace_if_current("k", "v0", &format!("v{}", i + 1), Duration::from_secs(10))
                    .await
                    .unwrap()
            })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results.into_iter().filter(|r| matches!(r, Ok(true))).count();
        assert_eq!(winners, 1);
        assert_ne!(store.get("k").await.unwrap().as_deref(), Some("v0"));
    }

    #[tokio::test]
    async fn test_concurrent_get_and_delete_has_one_winner() {
        let store = SessionStore::in_memory(Clock::manual(0));
        store.put("k", "v", Duration::from_secs(10)).await.unwrap();

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_and_delete("k").await.unwrap() })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Some(_))))
            .count();
        assert_eq!(winners, 1);
    }
}
