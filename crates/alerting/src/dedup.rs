//! Deduplication Gate
//!
//! At most one notification per (org, device, alarm, user) within the alarm's
//! repeat interval. The gate is a single atomic create on the cache, so it holds
//! across workers and replicas sharing that cache.

use cache::{Cache, CacheError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const REPEAT_VALUE: &str = "1";

/// Cache key guarding one recipient of one alarm on one device
pub fn repeat_key(org_id: &str, dev_id: &str, alarm_id: &str, user_id: &str) -> String {
    format!("alerter:repeat:org:{org_id}:dev:{dev_id}:alarm:{alarm_id}:user:{user_id}")
}

/// Repeat-interval suppression built on the cache primitive
pub struct DedupGate {
    cache: Arc<dyn Cache>,
}

impl DedupGate {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Claim the send slot for this tuple for `ttl`.
    ///
    /// `Ok(false)` means a notification was already sent inside the window.
    /// Errors mean the cache is unavailable; callers must not send.
    pub async fn try_acquire(
        &self,
        org_id: &str,
        dev_id: &str,
        alarm_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let key = repeat_key(org_id, dev_id, alarm_id, user_id);
        let acquired = self.cache.set_if_not_exist_ttl(&key, REPEAT_VALUE, ttl).await?;
        debug!(key = %key, acquired, "Repeat check");
        Ok(acquired)
    }
}
