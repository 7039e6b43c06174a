//! Configuration types for backing stores.
//!
//! Loaded from environment variables with sensible defaults for development.

use crate::error::{CacheError, CacheResult, ConfigError};
use std::path::PathBuf;

/// Largest map size, in megabytes, whose byte count still fits in `usize`.
pub const MAX_LMDB_SIZE_MB: usize = usize::MAX / (1024 * 1024);

/// Backing store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Prefix prepended to every key the store persists.
    /// Flushing a prefixed store only clears keys under its own prefix.
    pub prefix: String,

    /// Directory holding the LMDB environment.
    pub lmdb_path: PathBuf,

    /// Maximum size of the LMDB map in megabytes.
    pub lmdb_max_size_mb: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            lmdb_path: PathBuf::from("./data/memoguard"),
            lmdb_max_size_mb: 64,
        }
    }
}

impl StoreConfig {
    /// Create a store config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `MEMOGUARD_PREFIX`: Key prefix (default: empty)
    /// - `MEMOGUARD_LMDB_PATH`: LMDB directory (default: ./data/memoguard)
    /// - `MEMOGUARD_LMDB_MAX_SIZE_MB`: LMDB map size in MB (default: 64)
    pub fn from_env() -> CacheResult<Self> {
        let defaults = Self::default();

        let prefix = std::env::var("MEMOGUARD_PREFIX").unwrap_or(defaults.prefix);

        let lmdb_path = std::env::var("MEMOGUARD_LMDB_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.lmdb_path);

        let lmdb_max_size_mb = match std::env::var("MEMOGUARD_LMDB_MAX_SIZE_MB") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
                CacheError::Config(ConfigError::InvalidValue {
                    field: "lmdb_max_size_mb".to_string(),
                    value: raw.clone(),
                    reason: "must be a positive integer".to_string(),
                })
            })?,
            Err(_) => defaults.lmdb_max_size_mb,
        };

        let config = Self {
            prefix,
            lmdb_path,
            lmdb_max_size_mb,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the LMDB directory.
    pub fn with_lmdb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lmdb_path = path.into();
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.lmdb_max_size_mb = max_size_mb;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CacheResult<()> {
        if self.lmdb_max_size_mb == 0 {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "lmdb_max_size_mb".to_string(),
                value: self.lmdb_max_size_mb.to_string(),
                reason: "lmdb_max_size_mb must be greater than 0".to_string(),
            }));
        }

        if self.lmdb_max_size_mb > MAX_LMDB_SIZE_MB {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "lmdb_max_size_mb".to_string(),
                value: self.lmdb_max_size_mb.to_string(),
                reason: format!("lmdb_max_size_mb must not exceed {}", MAX_LMDB_SIZE_MB),
            }));
        }

        if self.lmdb_path.as_os_str().is_empty() {
            return Err(CacheError::Config(ConfigError::MissingField {
                field: "lmdb_path".to_string(),
            }));
        }

        if self.prefix.chars().any(char::is_control) {
            return Err(CacheError::Config(ConfigError::InvalidValue {
                field: "prefix".to_string(),
                value: self.prefix.escape_debug().to_string(),
                reason: "prefix must not contain control characters".to_string(),
            }));
        }

        Ok(())
    }
}
