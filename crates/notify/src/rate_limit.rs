//! Channel Rate Limiting
//!
//! One cache key per channel acts as a global lock with a fixed hold time.
//! Holding the key for the channel's minimum spacing paces sends across every
//! worker and replica sharing the cache, not per recipient.

use cache::{Cache, CacheError};
use models::AlarmType;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const LOCK_VALUE: &str = "1";

/// Minimum spacing between sends, per channel
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Push spacing in milliseconds (default: 500, ~2/sec)
    pub app_ms: u64,
    /// SMS spacing in milliseconds (default: 1000)
    pub sms_ms: u64,
    /// Email spacing in milliseconds (default: 333, ~3/sec)
    pub email_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            app_ms: 500,
            sms_ms: 1000,
            email_ms: 333,
        }
    }
}

impl RateLimitConfig {
    /// Lock key and hold time for a channel
    pub fn channel(&self, alarm_type: AlarmType) -> Option<(&'static str, Duration)> {
        match alarm_type {
            AlarmType::App => Some(("notify:ratelimit:app", Duration::from_millis(self.app_ms))),
            AlarmType::Sms => Some(("notify:ratelimit:sms", Duration::from_millis(self.sms_ms))),
            AlarmType::Email => Some((
                "notify:ratelimit:email",
                Duration::from_millis(self.email_ms),
            )),
            AlarmType::Unspecified => None,
        }
    }
}

/// Take the lock at `key`, sleeping `hold` between attempts while it is held.
///
/// Returns once this caller created the key. Cache failures abort immediately.
pub async fn acquire(cache: &dyn Cache, key: &str, hold: Duration) -> Result<(), CacheError> {
    let mut attempts: u32 = 1;
    while !cache.set_if_not_exist_ttl(key, LOCK_VALUE, hold).await? {
        tokio::time::sleep(hold).await;
        attempts += 1;
    }

    if attempts > 1 {
        debug!(key, attempts, "Rate limit lock acquired after waiting");
    }
    Ok(())
}
