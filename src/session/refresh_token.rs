use std::time::Duration;

use super::{SessionStore, StoreError};

fn key(principal_id: i64) -> String {
    format!("refresh:{}", principal_id)
}

/// The one live refresh token per principal.
pub struct RefreshTokenStore<'a> {
    store: &'a SessionStore,
}

impl<'a> RefreshTokenStore<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    /// Record `token` as the principal's current refresh token. Any previous
    /// token for the principal stops being accepted.
    pub async fn set(&self, principal_id: i64, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.store.put(&key(principal_id), token, ttl).await
    }

    /// Swap `presented` for `replacement` if `presented` is still the live
    /// token. At most one of several concurrent callers succeeds.
    pub async fn rotate(
        &self,
        principal_id: i64,
        presented: &str,
        replacement: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.store
            .replace_if_current(&key(principal_id), presented, replacement, ttl)
            .await
    }

    pub async fn current(&self, principal_id: i64) -> Result<Option<String>, StoreError> {
        self.store.get(&key(principal_id)).await
    }

    /// Forget the principal's refresh token. Idempotent.
    pub async fn revoke(&self, principal_id: i64) -> Result<bool, StoreError> {
        self.store.delete(&key(principal_id)).await
    }
}
