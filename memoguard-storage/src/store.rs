//! Backing store contract and cache statistics.
//!
//! This module defines the trait every durable tier must implement before it
//! can sit behind a [`MemoGuard`](crate::MemoGuard).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use memoguard_core::{CacheResult, CacheValue};

/// Backing store trait for pluggable durable cache tiers.
///
/// This trait abstracts over different stores (LMDB, in-memory, remote
/// key-value services). Implementations own expiry, eviction and persistence;
/// the memo layer never second-guesses them.
///
/// # Key Format
///
/// Callers pass bare keys. Implementations prepend their [`prefix`](Self::prefix)
/// before persisting, and [`flush`](Self::flush) is scoped to that prefix when
/// the store is shared.
///
/// # Counters
///
/// `increment` and `decrement` operate on integer values. A missing key counts
/// from zero. A value that is not an integer is an error.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value, or `None` if the key is missing or expired.
    async fn fetch(&self, key: &str) -> CacheResult<Option<CacheValue>>;

    /// Get a value, falling back to `default` when the store misses.
    async fn get(&self, key: &str, default: CacheValue) -> CacheResult<CacheValue> {
        Ok(self.fetch(key).await?.unwrap_or(default))
    }

    /// Get several values at once.
    ///
    /// Every requested key appears in the result; missing keys map to `Null`.
    async fn get_many(&self, keys: &HashSet<String>) -> CacheResult<HashMap<String, CacheValue>> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = self.fetch(key).await?.unwrap_or(CacheValue::Null);
            values.insert(key.clone(), value);
        }
        Ok(values)
    }

    /// Store a value for the given duration.
    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()>;

    /// Store several values for the same duration.
    async fn put_many(&self, values: &HashMap<String, CacheValue>, ttl: Duration) -> CacheResult<()> {
        for (key, value) in values {
            self.put(key, value.clone(), ttl).await?;
        }
        Ok(())
    }

    /// Add `delta` to an integer value and return the new value.
    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Subtract `delta` from an integer value and return the new value.
    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Store a value with no expiry.
    async fn forever(&self, key: &str, value: CacheValue) -> CacheResult<()>;

    /// Remove a value. Returns whether anything was removed.
    async fn forget(&self, key: &str) -> CacheResult<bool>;

    /// Remove every value under this store's prefix.
    async fn flush(&self) -> CacheResult<()>;

    /// The key prefix this store applies.
    fn prefix(&self) -> String;
}

/// Statistics about memo usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads answered by the memo.
    pub hits: u64,
    /// Number of reads that went to the backing store.
    pub misses: u64,
    /// Number of entries currently memoized.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
