//! MemoGuard Test Utilities
//!
//! Centralized test infrastructure for the MemoGuard workspace:
//! - Proptest generators for keys, values, TTLs and counter deltas
//! - Fixtures wiring a guard to a recording mock store
//! - Custom assertions for memo and error state

// Re-export the mock store from its source crate
pub use memoguard_storage::{MemoGuard, MockStore, StoreOp};

// Re-export core types for convenience
pub use memoguard_core::{
    counter_value, CacheError, CacheResult, CacheValue, ConfigError, StoreConfig, StoreError, Ttl,
};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating cache inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Generate a cache key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9:_]{0,15}"
    }

    /// Generate a pair of distinct keys.
    pub fn arb_key_pair() -> impl Strategy<Value = (String, String)> {
        (arb_key(), arb_key()).prop_filter("keys must differ", |(a, b)| a != b)
    }

    /// Generate a non-null cache value.
    pub fn arb_value() -> impl Strategy<Value = CacheValue> {
        prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(|b| json!(b)),
            "[ -~]{0,24}".prop_map(|s| json!(s)),
            prop::collection::vec(any::<i32>(), 0..4).prop_map(|v| json!(v)),
            ("[a-z]{1,8}", any::<i32>()).prop_map(|(k, v)| {
                let mut object = serde_json::Map::new();
                object.insert(k, json!(v));
                CacheValue::Object(object)
            }),
        ]
    }

    /// Generate a ttl that resolves to a usable duration.
    pub fn arb_ttl() -> impl Strategy<Value = Ttl> {
        prop_oneof![
            (2u64..86_400).prop_map(|secs| Ttl::For(Duration::from_secs(secs))),
            (1u32..1_440).prop_map(|minutes| Ttl::Minutes(minutes as f64)),
            (60i64..86_400).prop_map(|secs| Ttl::Until(Utc::now() + chrono::Duration::seconds(secs))),
        ]
    }

    /// Generate a ttl that resolves to nothing and so suppresses writes.
    pub fn arb_unusable_ttl() -> impl Strategy<Value = Option<Ttl>> {
        prop_oneof![
            Just(None),
            (0u64..1_000).prop_map(|ms| Some(Ttl::For(Duration::from_millis(ms)))),
            (-1_000i32..=0).prop_map(|m| Some(Ttl::Minutes(m as f64))),
            (1i64..86_400)
                .prop_map(|secs| Some(Ttl::Until(Utc::now() - chrono::Duration::seconds(secs)))),
        ]
    }

    /// Generate a counter delta small enough never to overflow in tests.
    pub fn arb_delta() -> impl Strategy<Value = i64> {
        1i64..1_000_000
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A ttl that is always usable in tests.
    pub fn ten_minutes() -> Option<Ttl> {
        Some(Ttl::Minutes(10.0))
    }

    /// A guard wired to a fresh mock store.
    pub fn mock_guard() -> (MemoGuard<MockStore>, Arc<MockStore>) {
        let store = Arc::new(MockStore::new());
        (MemoGuard::new(Arc::clone(&store)), store)
    }

    /// A guard wired to a mock store reporting `prefix`.
    pub fn prefixed_guard(prefix: &str) -> (MemoGuard<MockStore>, Arc<MockStore>) {
        let store = Arc::new(MockStore::with_prefix(prefix));
        (MemoGuard::new(Arc::clone(&store)), store)
    }

    /// A guard whose store already holds `entries`.
    pub fn seeded_guard(
        entries: &[(&str, CacheValue)],
    ) -> CacheResult<(MemoGuard<MockStore>, Arc<MockStore>)> {
        let (guard, store) = mock_guard();
        for (key, value) in entries {
            store.seed(key, value.clone())?;
        }
        Ok((guard, store))
    }

    /// Build a current-thread runtime for driving async code inside proptest.
    pub fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap_or_else(|e| panic!("failed to build test runtime: {}", e))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for memo-specific validation.

    use super::*;

    /// Assert that a CacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a CacheResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a CacheResult is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is an injected Unavailable error.
    #[track_caller]
    pub fn assert_unavailable<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Store(StoreError::Unavailable { .. })) => {}
            other => panic!("Expected Unavailable error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that the guard memoizes `key` with `expected`.
    #[track_caller]
    pub fn assert_memoized(guard: &MemoGuard<MockStore>, key: &str, expected: &CacheValue) {
        match guard.memoized(key) {
            Ok(Some(value)) => assert_eq!(&value, expected, "Wrong memoized value for {}", key),
            other => panic!("Expected {} to be memoized, got: {:?}", key, other),
        }
    }

    /// Assert that the guard does not memoize `key`.
    #[track_caller]
    pub fn assert_not_memoized(guard: &MemoGuard<MockStore>, key: &str) {
        match guard.memoized(key) {
            Ok(None) => {}
            other => panic!("Expected {} to be absent from the memo, got: {:?}", key, other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
