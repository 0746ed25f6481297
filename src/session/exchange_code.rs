use std::time::Duration;
use tracing::warn;

use super::{SessionStore, StoreError};

fn key(code: &str) -> String {
    format!("code:{}", code)
}

/// Single-use codes that bridge a browser redirect to a token pair.
pub struct ExchangeCodeStore<'a> {
    store: &'a SessionStore,
}

impl<'a> ExchangeCodeStore<'a> {
    pub fn new(store: &'a SessionStore) -> Self {
        Self { store }
    }

    pub async fn store(&self, code: &str, principal_id: i64, ttl: Duration) -> Result<(), StoreError> {
        self.store
            .put(&key(code), &principal_id.to_string(), ttl)
            .await
    }

    /// Get and remove a code.
    ///
    /// Returns None if the code never existed, has expired, or was already
    /// taken by another caller.
    pub async fn take(&self, code: &str) -> Result<Option<i64>, StoreError> {
        let Some(value) = self.store.get_and_delete(&key(code)).await? else {
            return Ok(None);
        };

        match value.parse::<i64>() {
            Ok(principal_id) => Ok(Some(principal_id)),
            Err(_) => {
                warn!("Discarding exchange code with unreadable principal id");
                Ok(None)
            }
        }
    }
}
