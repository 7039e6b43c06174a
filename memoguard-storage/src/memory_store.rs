//! Process-local backing store.
//!
//! Entries carry an optional expiry instant. Expired entries read as missing
//! and are dropped on the next write that touches them.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use memoguard_core::{counter_value, CacheResult, CacheValue, StoreConfig, StoreError};

use crate::store::CacheStore;

struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory [`CacheStore`] with per-entry expiry and key prefixing.
pub struct InMemoryStore {
    prefix: String,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    /// Create an empty store with no prefix.
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Create an empty store that prefixes every key.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create an empty store from configuration.
    pub fn from_config(config: &StoreConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::with_prefix(config.prefix.clone()))
    }

    /// Number of live entries.
    pub fn len(&self) -> CacheResult<usize> {
        let now = Instant::now();
        Ok(self.read()?.values().filter(|e| e.is_live(now)).count())
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn read(&self) -> CacheResult<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .read()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    fn write(&self) -> CacheResult<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    pub(crate) fn insert(
        &self,
        key: &str,
        value: CacheValue,
        expires_at: Option<Instant>,
    ) -> CacheResult<()> {
        self.write()?
            .insert(self.scoped(key), Entry { value, expires_at });
        Ok(())
    }

    /// Read a live value without going through the async store contract.
    pub(crate) fn peek(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let now = Instant::now();
        Ok(self
            .read()?
            .get(&self.scoped(key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    /// Apply a signed delta to an integer entry, keeping its expiry.
    fn adjust(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let scoped = self.scoped(key);
        let now = Instant::now();
        let mut entries = self.write()?;

        let (current, expires_at) = match entries.get(&scoped) {
            Some(entry) if entry.is_live(now) => {
                let current = counter_value(&entry.value).ok_or_else(|| StoreError::NotNumeric {
                    key: key.to_string(),
                })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current.checked_add(delta).ok_or_else(|| StoreError::NotNumeric {
            key: key.to_string(),
        })?;
        entries.insert(
            scoped,
            Entry {
                value: CacheValue::from(next),
                expires_at,
            },
        );
        Ok(next)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn fetch(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        self.peek(key)
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.insert(key, value, Instant::now().checked_add(ttl))
    }

    async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.adjust(key, delta)
    }

    async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let negated = delta.checked_neg().ok_or_else(|| StoreError::NotNumeric {
            key: key.to_string(),
        })?;
        self.adjust(key, negated)
    }

    async fn forever(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.insert(key, value, None)
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        Ok(self.write()?.remove(&self.scoped(key)).is_some())
    }

    async fn flush(&self) -> CacheResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn prefix(&self) -> String {
        self.prefix.clone()
    }
}
