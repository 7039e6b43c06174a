//! MemoGuard Core - Shared Types
//!
//! Pure data structures used by the memo decorator and its backing stores:
//! the cached value type, TTL forms, the error taxonomy and store configuration.
//! This crate does no I/O.

pub mod config;
pub mod error;
pub mod ttl;

pub use config::StoreConfig;
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use ttl::Ttl;

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Opaque value held by the memo table and the backing stores.
///
/// `Null` is what a miss resolves to when the caller passes no meaningful
/// default, so repository helpers treat it as "absent".
pub type CacheValue = serde_json::Value;

/// Read a counter out of a cached value.
///
/// Counters are JSON integers. Strings holding an integer are accepted too,
/// since stores written by other clients commonly persist counters as text.
pub fn counter_value(value: &CacheValue) -> Option<i64> {
    match value {
        CacheValue::Number(n) => n.as_i64(),
        CacheValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
