//! In-memory TTL map for single-process deployments

use crate::{Cache, CacheError};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Cache held in process memory. Atomicity comes from the per-shard entry lock.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        info!("Creating in-memory cache");
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    /// Value under `key` if present and unexpired
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let fresh = CacheEntry {
            value: value.to_string(),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return Ok(false);
                }
                held.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(true)
            }
        }
    }
}
