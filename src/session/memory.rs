use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use subtle::ConstantTimeEq;

use crate::clock::Clock;

struct Entry {
    value: String,
    expires_at: u64,
}

/// In-process TTL map. Every operation runs under one lock, so
/// `get_and_delete` is exactly-once across tasks.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Clock,
}

impl MemoryStore {
    pub fn new(clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, key: &str, value: &str, ttl_secs: u64) {
        let expires_at = self.clock.now_secs().saturating_add(ttl_secs);
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Replace the live value under `key` with `value` only if it currently
    /// equals `expected`. Compare and insert happen under the same lock.
    pub fn replace_if_current(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl_secs: u64,
    ) -> bool {
        let now = self.clock.now_secs();
        let mut entries = self.lock();

        let matches = entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .is_some_and(|entry| bool::from(entry.value.as_bytes().ct_eq(expected.as_bytes())));
        if !matches {
            return false;
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now.saturating_add(ttl_secs),
            },
        );
        true
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now_secs();
        self.lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    pub fn delete(&self, key: &str) -> bool {
        self.get_and_delete(key).is_some()
    }

    pub fn get_and_delete(&self, key: &str) -> Option<String> {
        let now = self.clock.now_secs();
        self.lock()
            .remove(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value)
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
