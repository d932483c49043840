//! Time-bounded memoization of the last computed value.
//!
//! Exactly one value is cached per process. The lock guards only the
//! in-memory slot: callers compute new values outside of it and hand the
//! result to [`ResultCache::store`]. Two concurrent writers race and the
//! later `store` wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// The cached value and when it was produced.
#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    computed_at: Instant,
    computed_wall: DateTime<Utc>,
}

/// Single-slot cache with TTL expiry.
#[derive(Debug)]
pub struct ResultCache<T> {
    slot: Mutex<Option<Slot<T>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl<T: Clone> ResultCache<T> {
    /// Create an empty cache. A zero TTL disables caching entirely.
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a copy of the cached value if it is younger than the TTL.
    pub fn try_get_fresh(&self) -> Option<T> {
        let fresh = {
            let guard = self.lock();
            guard
                .as_ref()
                .filter(|slot| slot.computed_at.elapsed() < self.ttl)
                .map(|slot| slot.value.clone())
        };
        match fresh {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Replace the cached value and restart its TTL.
    pub fn store(&self, value: T) {
        *self.lock() = Some(Slot {
            value,
            computed_at: Instant::now(),
            computed_wall: Utc::now(),
        });
        self.stores.fetch_add(1, Ordering::Relaxed);
        debug!(ttl_secs = self.ttl.as_secs(), "Cached value replaced");
    }

    /// Point-in-time statistics. Does not count as a lookup.
    pub fn stats(&self) -> CacheStats {
        let (fresh, last_computed_at) = {
            let guard = self.lock();
            match guard.as_ref() {
                Some(slot) => (slot.computed_at.elapsed() < self.ttl, Some(slot.computed_wall)),
                None => (false, None),
            }
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            fresh,
            last_computed_at,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    // Slot is plain data; a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Option<Slot<T>>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pretend the cached value was computed `age` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&self, age: Duration) {
        if let Some(slot) = self.lock().as_mut() {
            if let Some(earlier) = slot.computed_at.checked_sub(age) {
                slot.computed_at = earlier;
            }
        }
    }

    /// Current slot contents, fresh or not.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<T> {
        self.lock().as_ref().map(|slot| slot.value.clone())
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the slot.
    pub hits: u64,
    /// Lookups that found the slot empty or stale.
    pub misses: u64,
    /// Successful replacements of the slot.
    pub stores: u64,
    /// Whether the slot currently holds a fresh value.
    pub fresh: bool,
    pub last_computed_at: Option<DateTime<Utc>>,
    pub ttl_secs: u64,
}
