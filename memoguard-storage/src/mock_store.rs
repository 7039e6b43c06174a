//! Recording mock store for testing the memo layer.
//!
//! Wraps an [`InMemoryStore`], counts every call per operation and can be
//! told to fail the next call of a given operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use memoguard_core::{CacheResult, CacheValue, StoreError};

use crate::memory_store::InMemoryStore;
use crate::store::CacheStore;

/// Store operation discriminator for call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Fetch,
    Get,
    GetMany,
    Put,
    PutMany,
    Increment,
    Decrement,
    Forever,
    Forget,
    Flush,
    Prefix,
}

/// Mock [`CacheStore`] with call counting and failure injection.
#[derive(Default)]
pub struct MockStore {
    inner: InMemoryStore,
    calls: Mutex<HashMap<StoreOp, usize>>,
    failures: Mutex<HashSet<StoreOp>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockStore {
    /// Create an empty mock store with no prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mock store that reports the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            inner: InMemoryStore::with_prefix(prefix),
            ..Self::default()
        }
    }

    /// Write a value directly into the wrapped store without counting a call.
    pub fn seed(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.inner.insert(key, value, None)
    }

    /// Read a value directly from the wrapped store without counting a call.
    pub fn peek(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.inner.peek(key)
    }

    /// Make the next call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp) {
        lock(&self.failures).insert(op);
    }

    /// Number of calls made for `op`.
    pub fn calls(&self, op: StoreOp) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made across all operations.
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Reset all call counters.
    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, op: StoreOp) -> CacheResult<()> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;
        if lock(&self.failures).remove(&op) {
            return Err(StoreError::Unavailable {
                reason: format!("injected failure for {:?}", op),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MockStore {
    async fn fetch(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.record(StoreOp::Fetch)?;
        self.inner.fetch(key).await
    }

    async fn get(&self, key: &str, default: CacheValue) -> CacheResult<CacheValue> {
        self.record(StoreOp::Get)?;
        self.inner.get(key, default).await
    }

    async fn get_many(&self, keys: &HashSet<String>) -> CacheResult<HashMap<String, CacheValue>> {
        self.record(StoreOp::GetMany)?;
        self.inner.get_many(keys).await
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.record(StoreOp::Put)?;
        self.inner.put(key, value, ttl).await
    }

    async fn put_many(&self, values: &HashMap<String, CacheValue>, ttl: Duration) -> CacheResult<()> {
        self.record(StoreOp::PutMany)?;
        self.inner.put_many(values, ttl).await
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.record(StoreOp::Increment)?;
        self.inner.increment(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.record(StoreOp::Decrement)?;
        self.inner.decrement(key, delta).await
    }

    async fn forever(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.record(StoreOp::Forever)?;
        self.inner.forever(key, value).await
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.record(StoreOp::Forget)?;
        self.inner.forget(key).await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.record(StoreOp::Flush)?;
        self.inner.flush().await
    }

    fn prefix(&self) -> String {
        // Prefix is infallible in the contract, so injected failures do not apply.
        *lock(&self.calls).entry(StoreOp::Prefix).or_insert(0) += 1;
        self.inner.prefix()
    }
}
