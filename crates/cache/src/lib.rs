//! Cache Primitive
//!
//! A key-value store whose only write is an atomic "set if absent, with expiry".
//! Deduplication and channel rate limiting are both built on it, and it is the
//! only state shared between workers and service replicas.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Cache errors. A held key is not an error; see [`Cache::set_if_not_exist_ttl`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Atomically store `value` under `key` for `ttl` unless an unexpired entry
    /// exists. Returns `Ok(true)` if this call created the entry, `Ok(false)` if
    /// the key was already held.
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;
}
