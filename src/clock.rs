//! Time source shared by the token codec and the in-memory session store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix-seconds clock.
///
/// `System` reads wall time. `Manual` holds a shared counter so tests can
/// move time forward across every component that was handed a clone.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Manual(Arc<AtomicU64>),
}

impl Clock {
    /// A manual clock starting at the given Unix timestamp.
    pub fn manual(start_secs: u64) -> Self {
        Clock::Manual(Arc::new(AtomicU64::new(start_secs)))
    }

    /// Current Unix time in seconds.
    pub fn now_secs(&self) -> u64 {
        match self {
            Clock::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            Clock::Manual(secs) => secs.load(Ordering::SeqCst),
        }
    }

    /// Move a manual clock forward. No-op on the system clock.
    pub fn advance(&self, secs: u64) {
        if let Clock::Manual(current) = self {
            current.fetch_add(secs, Ordering::SeqCst);
        }
    }
}
