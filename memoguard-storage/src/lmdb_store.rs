//! LMDB-backed store with key prefixing.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped tier behind the memo layer.
//!
//! # Value Format
//!
//! Each value is framed as `[expires_at: 8 bytes][json value]`, where
//! `expires_at` is a little-endian millisecond timestamp and `0` means the
//! entry never expires. Expired entries read as missing.
//!
//! # Prefixing
//!
//! Keys are stored as the UTF-8 bytes of `prefix + key`. Several stores with
//! different prefixes can share one environment; `flush` only removes keys
//! under the calling store's prefix.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use memoguard_core::{counter_value, CacheResult, CacheValue, StoreConfig, StoreError};
use tracing::debug;

use crate::store::CacheStore;

/// Frame marker for entries without expiry.
const NEVER_EXPIRES: i64 = 0;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for memoguard_core::CacheError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization(reason) | LmdbStoreError::Deserialization(reason) => {
                memoguard_core::CacheError::Store(StoreError::Serialization { reason })
            }
            other => memoguard_core::CacheError::Store(StoreError::Transaction {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Decoded stored frame.
struct Frame {
    expires_at_millis: i64,
    value: CacheValue,
}

impl Frame {
    fn encode(&self) -> Result<Vec<u8>, LmdbStoreError> {
        let value_bytes = serde_json::to_vec(&self.value)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

        let mut bytes = Vec::with_capacity(8 + value_bytes.len());
        bytes.extend_from_slice(&self.expires_at_millis.to_le_bytes());
        bytes.extend_from_slice(&value_bytes);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, LmdbStoreError> {
        if bytes.len() < 8 {
            return Err(LmdbStoreError::Deserialization("Frame too short".into()));
        }
        let expiry_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbStoreError::Deserialization("Invalid expiry".into()))?;
        let value = serde_json::from_slice(&bytes[8..])
            .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;

        Ok(Self {
            expires_at_millis: i64::from_le_bytes(expiry_bytes),
            value,
        })
    }

    fn is_live(&self, now_millis: i64) -> bool {
        self.expires_at_millis == NEVER_EXPIRES || self.expires_at_millis > now_millis
    }
}

fn expiry_millis(ttl: Duration) -> i64 {
    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(ttl_millis)
}

/// LMDB-backed [`CacheStore`].
///
/// # Example
///
/// ```ignore
/// use memoguard_storage::{LmdbStore, MemoGuard};
/// use std::sync::Arc;
///
/// let store = Arc::new(LmdbStore::new("/tmp/cache", 64, "app:")?);
/// let guard = MemoGuard::new(store);
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Prefix prepended to every key.
    prefix: String,
}

impl LmdbStore {
    /// Open (or create) an LMDB store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    /// * `prefix` - Prefix prepended to every key
    pub fn new<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        prefix: impl Into<String>,
    ) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb.checked_mul(BYTES_PER_MB).ok_or_else(|| {
            LmdbStoreError::EnvOpen(format!("map size of {} MB overflows usize", max_size_mb))
        })?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            db,
            prefix: prefix.into(),
        })
    }

    /// Open a store from configuration.
    pub fn from_config(config: &StoreConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::new(
            &config.lmdb_path,
            config.lmdb_max_size_mb,
            config.prefix.clone(),
        )?)
    }

    fn scoped(&self, key: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.prefix.len() + key.len());
        bytes.extend_from_slice(self.prefix.as_bytes());
        bytes.extend_from_slice(key.as_bytes());
        bytes
    }

    fn write_frame(&self, wtxn: &mut RwTxn<'_>, key: &str, frame: &Frame) -> Result<(), LmdbStoreError> {
        let bytes = frame.encode()?;
        self.db
            .put(wtxn, &self.scoped(key), &bytes)
            .map_err(txn_err)
    }

    fn write_one(&self, key: &str, frame: Frame) -> Result<(), LmdbStoreError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.write_frame(&mut wtxn, key, &frame)?;
        wtxn.commit().map_err(txn_err)
    }

    /// Apply a signed delta inside one write transaction, keeping expiry.
    fn adjust(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let scoped = self.scoped(key);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let existing = self
            .db
            .get(&wtxn, &scoped)
            .map_err(txn_err)?
            .map(Frame::decode)
            .transpose()?
            .filter(|frame| frame.is_live(Utc::now().timestamp_millis()));

        let (current, expires_at_millis) = match existing {
            Some(frame) => {
                let current = counter_value(&frame.value).ok_or_else(|| StoreError::NotNumeric {
                    key: key.to_string(),
                })?;
                (current, frame.expires_at_millis)
            }
            None => (0, NEVER_EXPIRES),
        };

        let next = current.checked_add(delta).ok_or_else(|| StoreError::NotNumeric {
            key: key.to_string(),
        })?;
        let frame = Frame {
            expires_at_millis,
            value: CacheValue::from(next),
        };
        self.write_frame(&mut wtxn, key, &frame)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(next)
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_err)? {
            let (key, _) = result.map_err(txn_err)?;
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl CacheStore for LmdbStore {
    async fn fetch(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let frame = match self.db.get(&rtxn, &self.scoped(key)).map_err(txn_err)? {
            Some(bytes) => Frame::decode(bytes)?,
            None => return Ok(None),
        };

        if frame.is_live(Utc::now().timestamp_millis()) {
            Ok(Some(frame.value))
        } else {
            debug!(key, "lmdb entry expired");
            Ok(None)
        }
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: Duration) -> CacheResult<()> {
        let frame = Frame {
            expires_at_millis: expiry_millis(ttl),
            value,
        };
        Ok(self.write_one(key, frame)?)
    }

    async fn put_many(&self, values: &HashMap<String, CacheValue>, ttl: Duration) -> CacheResult<()> {
        let expires_at_millis = expiry_millis(ttl);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        for (key, value) in values {
            let frame = Frame {
                expires_at_millis,
                value: value.clone(),
            };
            self.write_frame(&mut wtxn, key, &frame)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
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
        let frame = Frame {
            expires_at_millis: NEVER_EXPIRES,
            value,
        };
        Ok(self.write_one(key, frame)?)
    }

    async fn forget(&self, key: &str) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, &self.scoped(key)).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    async fn flush(&self) -> CacheResult<()> {
        // An empty prefix owns the whole database.
        let scoped_keys = if self.prefix.is_empty() {
            None
        } else {
            Some(self.collect_keys_with_prefix(self.prefix.as_bytes())?)
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        match &scoped_keys {
            None => self.db.clear(&mut wtxn).map_err(txn_err)?,
            Some(keys) => {
                for key in keys {
                    self.db.delete(&mut wtxn, key).map_err(txn_err)?;
                }
                debug!(prefix = %self.prefix, deleted = keys.len(), "lmdb prefix flushed");
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn prefix(&self) -> String {
        self.prefix.clone()
    }
}
