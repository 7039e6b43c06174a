//! Request-scoped memo layer in front of a backing store.
//!
//! A [`MemoGuard`] remembers every value it reads or writes for the lifetime
//! of the instance, so repeated reads of the same key within one logical
//! operation never hit the backing store twice. Writes go to the memo first
//! and then through to the store.
//!
//! # Coherence
//!
//! The memo is a positive-result cache. A memoized key holds the last value
//! this instance read or wrote for it; a key that is not memoized says nothing
//! about the store. Writes update the memo before the store call and are not
//! rolled back if the store fails, so a failing `put` or `increment` leaves
//! the speculative local value in place.
//!
//! # Lifecycle
//!
//! Create one instance per request. The memo table is behind a single mutex so
//! an instance can be shared through an `Arc`, but the check-memo / update-memo /
//! call-store sequence is not atomic across tasks.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use memoguard_core::ttl::resolve_ttl;
use memoguard_core::{counter_value, CacheResult, CacheValue, StoreError, Ttl};
use tracing::{debug, warn};

use crate::store::{CacheStats, CacheStore};

#[derive(Debug, Default)]
struct MemoState {
    memo: HashMap<String, CacheValue>,
    hits: u64,
    misses: u64,
}

/// Memoizing decorator over a [`CacheStore`].
///
/// # Example
///
/// ```ignore
/// let guard = MemoGuard::new(Arc::new(InMemoryStore::new()));
///
/// guard.put("user:1", json!({"name": "Ada"}), Some(Ttl::Minutes(10.0))).await?;
///
/// // Answered from the memo, the store is not consulted.
/// let user = guard.get("user:1", CacheValue::Null).await?;
/// ```
pub struct MemoGuard<S: CacheStore + ?Sized> {
    /// The backing store. The guard never manages its lifecycle.
    store: Arc<S>,
    /// Memo table and hit/miss counters.
    state: Mutex<MemoState>,
}

impl<S: CacheStore + ?Sized> MemoGuard<S> {
    /// Create a guard with an empty memo.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Mutex::new(MemoState::default()),
        }
    }

    /// Get a reference to the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn state(&self) -> CacheResult<MutexGuard<'_, MemoState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned.into())
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Get a value, consulting the memo first.
    ///
    /// On a memo miss the store is asked with `default`, and whatever it
    /// returns (including `default` itself) is memoized for the rest of the
    /// instance's life.
    pub async fn get(&self, key: &str, default: CacheValue) -> CacheResult<CacheValue> {
        {
            let mut state = self.state()?;
            if let Some(value) = state.memo.get(key).cloned() {
                state.hits += 1;
                debug!(key, "memo hit");
                return Ok(value);
            }
            state.misses += 1;
        }

        debug!(key, "memo miss");
        let value = self.store.get(key, default).await?;
        self.state()?.memo.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Get several values straight from the store.
    ///
    /// Batch reads neither consult nor populate the memo.
    pub async fn get_many(&self, keys: &HashSet<String>) -> CacheResult<HashMap<String, CacheValue>> {
        debug!(count = keys.len(), "batch read bypasses memo");
        self.store.get_many(keys).await
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store a value in both tiers.
    ///
    /// A `None` ttl, or one that resolves to less than a second, makes this a
    /// no-op on both tiers.
    pub async fn put(&self, key: &str, value: CacheValue, ttl: Option<Ttl>) -> CacheResult<()> {
        let Some(duration) = resolve_ttl(ttl) else {
            debug!(key, "put skipped without a usable ttl");
            return Ok(());
        };
        self.write_through(key, value, duration).await
    }

    async fn write_through(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        self.state()?.memo.insert(key.to_string(), value.clone());
        debug!(key, ttl_secs = ttl.as_secs_f64(), "memo write");
        self.store.put(key, value, ttl).await
    }

    /// Store several values in the backing store only.
    ///
    /// Batch writes are exclusive: they run no single-key logic and never
    /// populate the memo. Memoized entries for the written keys are dropped so
    /// the next read sees the batch value. A ttl that does not resolve makes
    /// this a no-op.
    pub async fn put_many(
        &self,
        values: &HashMap<String, CacheValue>,
        ttl: Option<Ttl>,
    ) -> CacheResult<()> {
        let Some(duration) = resolve_ttl(ttl) else {
            debug!(count = values.len(), "put_many skipped without a usable ttl");
            return Ok(());
        };
        {
            let mut state = self.state()?;
            for key in values.keys() {
                state.memo.remove(key);
            }
        }
        self.store.put_many(values, duration).await
    }

    /// Increment a counter and return the store's new value.
    ///
    /// The memo is updated independently of the store: an existing memoized
    /// counter gains `delta`, an absent one is seeded with `delta`.
    pub async fn increment(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.adjust_memo(key, Some(delta), |current| current.checked_add(delta))?;
        self.store.increment(key, delta).await
    }

    /// Decrement a counter and return the store's new value.
    ///
    /// An existing memoized counter loses `delta`, an absent one is seeded
    /// with `-delta`.
    pub async fn decrement(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.adjust_memo(key, delta.checked_neg(), |current| current.checked_sub(delta))?;
        self.store.decrement(key, delta).await
    }

    /// Update a memoized counter. A memoized `Null` counts as absent. Values
    /// that are not integers, and updates that overflow, evict the entry so the
    /// next read goes to the store.
    fn adjust_memo(
        &self,
        key: &str,
        seed: Option<i64>,
        apply: impl FnOnce(i64) -> Option<i64>,
    ) -> CacheResult<()> {
        let mut state = self.state()?;
        let next = match state.memo.get(key) {
            None | Some(CacheValue::Null) => seed,
            Some(current) => counter_value(current).and_then(apply),
        };

        match next {
            Some(value) => {
                state.memo.insert(key.to_string(), CacheValue::from(value));
            }
            None => {
                state.memo.remove(key);
                warn!(key, "memoized counter could not be updated, evicting");
            }
        }
        Ok(())
    }

    /// Store a value with no expiry in both tiers.
    pub async fn forever(&self, key: &str, value: CacheValue) -> CacheResult<()> {
        self.state()?.memo.insert(key.to_string(), value.clone());
        self.store.forever(key, value).await
    }

    /// Remove a value from both tiers and return the store's result.
    pub async fn forget(&self, key: &str) -> CacheResult<bool> {
        self.state()?.memo.remove(key);
        self.store.forget(key).await
    }

    /// Clear the memo, then the backing store.
    pub async fn flush(&self) -> CacheResult<()> {
        self.flush_local()?;
        self.store.flush().await
    }

    /// Clear the memo only. The backing store is never touched.
    pub fn flush_local(&self) -> CacheResult<()> {
        let mut state = self.state()?;
        debug!(entries = state.memo.len(), "memo cleared");
        state.memo.clear();
        Ok(())
    }

    /// The backing store's key prefix.
    pub fn get_prefix(&self) -> String {
        self.store.prefix()
    }

    // ========================================================================
    // REPOSITORY HELPERS
    // ========================================================================

    /// Whether `key` holds a non-null value. Memoizes the read.
    pub async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(!self.get(key, CacheValue::Null).await?.is_null())
    }

    /// Whether `key` is null or absent. Memoizes the read.
    pub async fn missing(&self, key: &str) -> CacheResult<bool> {
        Ok(!self.has(key).await?)
    }

    /// Read a value and then forget it from both tiers.
    pub async fn pull(&self, key: &str, default: CacheValue) -> CacheResult<CacheValue> {
        let value = self.get(key, default).await?;
        self.forget(key).await?;
        Ok(value)
    }

    /// Store a value only if the key currently reads as null.
    ///
    /// Returns whether the value was written. A ttl that does not resolve
    /// writes nothing and returns `false`.
    pub async fn add(&self, key: &str, value: CacheValue, ttl: Option<Ttl>) -> CacheResult<bool> {
        let Some(duration) = resolve_ttl(ttl) else {
            return Ok(false);
        };
        if !self.get(key, CacheValue::Null).await?.is_null() {
            return Ok(false);
        }
        self.write_through(key, value, duration).await?;
        Ok(true)
    }

    /// Read a value, producing and storing it with `ttl` when it reads as null.
    pub async fn remember<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Ttl>,
        producer: F,
    ) -> CacheResult<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<CacheValue>>,
    {
        let existing = self.get(key, CacheValue::Null).await?;
        if !existing.is_null() {
            return Ok(existing);
        }
        let value = producer().await?;
        self.put(key, value.clone(), ttl).await?;
        Ok(value)
    }

    /// Read a value, producing and storing it forever when it reads as null.
    pub async fn remember_forever<F, Fut>(&self, key: &str, producer: F) -> CacheResult<CacheValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<CacheValue>>,
    {
        let existing = self.get(key, CacheValue::Null).await?;
        if !existing.is_null() {
            return Ok(existing);
        }
        let value = producer().await?;
        self.forever(key, value.clone()).await?;
        Ok(value)
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Whether `key` is currently memoized.
    pub fn is_memoized(&self, key: &str) -> CacheResult<bool> {
        Ok(self.state()?.memo.contains_key(key))
    }

    /// The memoized value for `key`, without consulting the store.
    pub fn memoized(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        Ok(self.state()?.memo.get(key).cloned())
    }

    /// Number of memoized entries.
    pub fn memo_len(&self) -> CacheResult<usize> {
        Ok(self.state()?.memo.len())
    }

    /// Memo hit/miss statistics.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let state = self.state()?;
        Ok(CacheStats {
            hits: state.hits,
            misses: state.misses,
            entry_count: state.memo.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_store::{MockStore, StoreOp};
    use memoguard_core::CacheError;
    use serde_json::json;

    fn guard() -> (MemoGuard<MockStore>, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        (MemoGuard::new(Arc::clone(&store)), store)
    }

    fn ttl() -> Option<Ttl> {
        Some(Ttl::Minutes(10.0))
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_memo() {
        let (guard, store) = guard();
        store.seed("k", json!("stored")).unwrap();

        assert_eq!(guard.get("k", json!("d")).await.unwrap(), json!("stored"));
        assert_eq!(guard.get("k", json!("other")).await.unwrap(), json!("stored"));
        assert_eq!(store.calls(StoreOp::Get), 1);

        let stats = guard.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_default_is_memoized_on_miss() {
        let (guard, store) = guard();

        assert_eq!(guard.get("k", json!(7)).await.unwrap(), json!(7));
        store.seed("k", json!("arrived later")).unwrap();

        // The default now shadows the store value for this instance.
        assert_eq!(guard.get("k", json!(8)).await.unwrap(), json!(7));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_put_then_get_skips_store() {
        let (guard, store) = guard();

        guard.put("k", json!({"v": 1}), ttl()).await.unwrap();
        assert_eq!(guard.get("k", json!(null)).await.unwrap(), json!({"v": 1}));
        assert_eq!(store.calls(StoreOp::Put), 1);
        assert_eq!(store.calls(StoreOp::Get), 0);
        assert_eq!(store.peek("k").unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_put_without_ttl_is_noop() {
        let (guard, store) = guard();

        guard.put("k", json!(1), None).await.unwrap();
        assert!(!guard.is_memoized("k").unwrap());
        assert_eq!(store.total_calls(), 0);

        assert_eq!(guard.get("k", json!("d")).await.unwrap(), json!("d"));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_put_with_expired_ttl_is_noop() {
        let (guard, store) = guard();

        let past = chrono::Utc::now() - chrono::Duration::seconds(30);
        guard.put("k", json!(1), Some(Ttl::Until(past))).await.unwrap();
        guard.put("k", json!(1), Some(Ttl::Minutes(0.0))).await.unwrap();

        assert!(!guard.is_memoized("k").unwrap());
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_increment_seeds_memo_independently_of_store() {
        let (guard, store) = guard();
        store.seed("n", json!(10)).unwrap();

        assert_eq!(guard.increment("n", 3).await.unwrap(), 13);
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(3)));

        assert_eq!(guard.increment("n", 2).await.unwrap(), 15);
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_decrement_seeds_negative_delta() {
        let (guard, store) = guard();
        store.seed("n", json!(10)).unwrap();

        assert_eq!(guard.decrement("n", 4).await.unwrap(), 6);
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(-4)));

        guard.put("m", json!(20), ttl()).await.unwrap();
        assert_eq!(guard.decrement("m", 5).await.unwrap(), 15);
        assert_eq!(guard.memoized("m").unwrap(), Some(json!(15)));
    }

    #[tokio::test]
    async fn test_failed_increment_keeps_speculative_memo() {
        let (guard, store) = guard();
        store.fail_next(StoreOp::Increment);

        let err = guard.increment("n", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::Unavailable { .. })));
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(1)));
        assert_eq!(store.peek("n").unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_after_null_read_seeds_delta() {
        let (guard, store) = guard();

        assert!(guard.missing("n").await.unwrap());
        assert_eq!(guard.memoized("n").unwrap(), Some(CacheValue::Null));

        assert_eq!(guard.increment("n", 1).await.unwrap(), 1);
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(1)));
        assert_eq!(store.peek("n").unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_decrement_after_null_read_seeds_negated_delta() {
        let (guard, _store) = guard();

        assert_eq!(guard.get("n", json!(null)).await.unwrap(), json!(null));
        assert_eq!(guard.decrement("n", 2).await.unwrap(), -2);
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(-2)));
    }

    #[tokio::test]
    async fn test_failed_decrement_keeps_speculative_memo() {
        let (guard, store) = guard();
        store.fail_next(StoreOp::Decrement);

        let err = guard.decrement("n", 3).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::Unavailable { .. })));
        assert_eq!(guard.memoized("n").unwrap(), Some(json!(-3)));
        assert_eq!(store.peek("n").unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_forever_keeps_speculative_memo() {
        let (guard, store) = guard();
        store.fail_next(StoreOp::Forever);

        assert!(guard.forever("k", json!("pinned")).await.is_err());
        assert_eq!(guard.memoized("k").unwrap(), Some(json!("pinned")));
        assert_eq!(guard.get("k", json!(null)).await.unwrap(), json!("pinned"));
        assert_eq!(store.peek("k").unwrap(), None);
        assert_eq!(store.calls(StoreOp::Get), 0);
    }

    #[tokio::test]
    async fn test_failed_put_keeps_speculative_memo() {
        let (guard, store) = guard();
        store.fail_next(StoreOp::Put);

        assert!(guard.put("k", json!("local"), ttl()).await.is_err());
        assert_eq!(guard.get("k", json!(null)).await.unwrap(), json!("local"));
        assert_eq!(store.peek("k").unwrap(), None);
    }

    #[tokio::test]
    async fn test_increment_on_non_numeric_memo_evicts() {
        let (guard, store) = guard();
        guard.put("k", json!("text"), ttl()).await.unwrap();

        // The store rejects the increment; the memo entry is already gone.
        assert!(guard.increment("k", 1).await.is_err());
        assert!(!guard.is_memoized("k").unwrap());
        assert_eq!(guard.get("k", json!(null)).await.unwrap(), json!("text"));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_forever_writes_both_tiers() {
        let (guard, store) = guard();

        guard.forever("k", json!([1, 2])).await.unwrap();
        assert_eq!(guard.memoized("k").unwrap(), Some(json!([1, 2])));
        assert_eq!(store.calls(StoreOp::Forever), 1);
        assert_eq!(store.peek("k").unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_forget_forces_requery() {
        let (guard, store) = guard();
        guard.put("k", json!("old"), ttl()).await.unwrap();
        store.seed("k", json!("fresh")).unwrap();

        assert!(guard.forget("k").await.unwrap());
        assert!(!guard.forget("k").await.unwrap());
        assert_eq!(guard.get("k", json!("gone")).await.unwrap(), json!("gone"));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_flush_clears_memo_and_calls_store_once() {
        let (guard, store) = guard();
        guard.put("a", json!(1), ttl()).await.unwrap();
        guard.put("b", json!(2), ttl()).await.unwrap();

        guard.flush().await.unwrap();
        assert_eq!(guard.memo_len().unwrap(), 0);
        assert_eq!(store.calls(StoreOp::Flush), 1);
        assert_eq!(store.peek("a").unwrap(), None);
    }

    #[tokio::test]
    async fn test_flush_clears_memo_even_when_store_fails() {
        let (guard, store) = guard();
        guard.put("a", json!(1), ttl()).await.unwrap();
        store.fail_next(StoreOp::Flush);

        assert!(guard.flush().await.is_err());
        assert_eq!(guard.memo_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_local_never_touches_store() {
        let (guard, store) = guard();
        guard.put("a", json!(1), ttl()).await.unwrap();
        store.reset_calls();

        guard.flush_local().unwrap();
        assert_eq!(guard.memo_len().unwrap(), 0);
        assert_eq!(store.total_calls(), 0);

        // The store still has the value, so the next read revalidates.
        assert_eq!(guard.get("a", json!(null)).await.unwrap(), json!(1));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_get_many_bypasses_memo() {
        let (guard, store) = guard();
        guard.put("k1", json!("memo"), ttl()).await.unwrap();
        store.seed("k1", json!("store")).unwrap();
        store.seed("k2", json!(2)).unwrap();

        let keys: HashSet<String> = ["k1", "k2"].iter().map(|k| k.to_string()).collect();
        let values = guard.get_many(&keys).await.unwrap();

        assert_eq!(values["k1"], json!("store"));
        assert_eq!(values["k2"], json!(2));
        assert!(!guard.is_memoized("k2").unwrap());
        assert_eq!(guard.memoized("k1").unwrap(), Some(json!("memo")));
        assert_eq!(store.calls(StoreOp::GetMany), 1);
    }

    #[tokio::test]
    async fn test_put_many_is_exclusive() {
        let (guard, store) = guard();
        let values: HashMap<String, CacheValue> = [
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();

        guard.put_many(&values, ttl()).await.unwrap();
        assert_eq!(store.calls(StoreOp::PutMany), 1);
        assert_eq!(store.calls(StoreOp::Put), 0);
        assert_eq!(guard.memo_len().unwrap(), 0);

        assert_eq!(guard.get("a", json!(null)).await.unwrap(), json!(1));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_put_many_drops_stale_memo_entries() {
        let (guard, store) = guard();
        guard.put("k", json!("A"), ttl()).await.unwrap();
        guard.put("untouched", json!("keep"), ttl()).await.unwrap();

        let values: HashMap<String, CacheValue> =
            [("k".to_string(), json!("B"))].into_iter().collect();
        guard.put_many(&values, ttl()).await.unwrap();

        assert!(!guard.is_memoized("k").unwrap());
        assert_eq!(guard.memoized("untouched").unwrap(), Some(json!("keep")));
        assert_eq!(store.peek("k").unwrap(), Some(json!("B")));
        assert_eq!(guard.get("k", json!(null)).await.unwrap(), json!("B"));
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_put_many_without_ttl_is_noop() {
        let (guard, store) = guard();
        let values: HashMap<String, CacheValue> =
            [("a".to_string(), json!(1))].into_iter().collect();

        guard.put_many(&values, None).await.unwrap();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_prefix_passthrough() {
        let store = Arc::new(MockStore::with_prefix("req:"));
        let guard = MemoGuard::new(Arc::clone(&store));

        assert_eq!(guard.get_prefix(), "req:");
        assert_eq!(store.calls(StoreOp::Prefix), 1);
    }

    #[tokio::test]
    async fn test_store_errors_propagate_unchanged() {
        let (guard, store) = guard();
        store.fail_next(StoreOp::Get);

        let err = guard.get("k", json!(null)).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::Unavailable { .. })));
        assert!(!guard.is_memoized("k").unwrap());
    }

    #[tokio::test]
    async fn test_has_and_missing() {
        let (guard, store) = guard();
        store.seed("present", json!(0)).unwrap();

        assert!(guard.has("present").await.unwrap());
        assert!(guard.missing("absent").await.unwrap());
        // Both reads were memoized.
        assert!(guard.is_memoized("absent").unwrap());
        assert!(guard.has("present").await.unwrap());
        assert_eq!(store.calls(StoreOp::Get), 2);
    }

    #[tokio::test]
    async fn test_pull_reads_then_forgets() {
        let (guard, store) = guard();
        store.seed("token", json!("abc")).unwrap();

        assert_eq!(guard.pull("token", json!(null)).await.unwrap(), json!("abc"));
        assert!(!guard.is_memoized("token").unwrap());
        assert_eq!(store.peek("token").unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_only_writes_when_null() {
        let (guard, store) = guard();
        store.seed("taken", json!(1)).unwrap();

        assert!(!guard.add("taken", json!(2), ttl()).await.unwrap());
        assert!(guard.add("free", json!(3), ttl()).await.unwrap());
        assert_eq!(guard.memoized("free").unwrap(), Some(json!(3)));
        assert_eq!(store.peek("free").unwrap(), Some(json!(3)));

        assert!(!guard.add("other", json!(4), None).await.unwrap());
        assert!(!guard.is_memoized("other").unwrap());
    }

    #[tokio::test]
    async fn test_remember_produces_once() {
        let (guard, store) = guard();

        let first = guard
            .remember("report", ttl(), || async { Ok(json!("built")) })
            .await
            .unwrap();
        let second = guard
            .remember("report", ttl(), || async { Ok(json!("rebuilt")) })
            .await
            .unwrap();

        assert_eq!(first, json!("built"));
        assert_eq!(second, json!("built"));
        assert_eq!(store.calls(StoreOp::Put), 1);
        assert_eq!(store.calls(StoreOp::Get), 1);
    }

    #[tokio::test]
    async fn test_remember_forever_stores_without_expiry() {
        let (guard, store) = guard();

        let value = guard
            .remember_forever("config", || async { Ok(json!({"debug": false})) })
            .await
            .unwrap();

        assert_eq!(value, json!({"debug": false}));
        assert_eq!(store.calls(StoreOp::Forever), 1);
    }

    #[tokio::test]
    async fn test_remember_propagates_producer_error() {
        let (guard, store) = guard();

        let result = guard
            .remember("k", ttl(), || async {
                Err(StoreError::Unavailable {
                    reason: "upstream down".to_string(),
                }
                .into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.calls(StoreOp::Put), 0);
    }

    #[tokio::test]
    async fn test_shared_guard_across_tasks() {
        let store = Arc::new(MockStore::new());
        let guard = Arc::new(MemoGuard::new(Arc::clone(&store)));

        let mut handles = Vec::new();
        for i in 0..8 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move {
                let key = format!("k{}", i);
                guard.put(&key, json!(i), Some(Ttl::seconds(60))).await.unwrap();
                guard.get(&key, json!(null)).await.unwrap()
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), json!(i));
        }

        assert_eq!(guard.memo_len().unwrap(), 8);
        assert_eq!(store.calls(StoreOp::Get), 0);
    }
}
