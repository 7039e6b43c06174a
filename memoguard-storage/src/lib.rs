//! MemoGuard Storage - Memo Layer and Backing Stores
//!
//! [`MemoGuard`] keeps a request-scoped memo table coherent with any
//! [`CacheStore`]. Two stores ship with the crate: [`InMemoryStore`] for
//! process-local use and [`LmdbStore`] for persistence. [`MockStore`] records
//! calls for tests.

pub mod lmdb_store;
pub mod memo_guard;
pub mod memory_store;
pub mod mock_store;
pub mod store;

pub use lmdb_store::{LmdbStore, LmdbStoreError};
pub use memo_guard::MemoGuard;
pub use memory_store::InMemoryStore;
pub use mock_store::{MockStore, StoreOp};
pub use store::{CacheStats, CacheStore};

pub use memoguard_core::{CacheError, CacheResult, CacheValue, StoreConfig, StoreError, Ttl};
