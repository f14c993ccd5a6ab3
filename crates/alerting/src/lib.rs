//! Alerting Pipeline
//!
//! Turns decoded device events into notifications: resolves the org and the
//! alarms bound to the event's rule, renders each alarm's subject and body,
//! suppresses repeats per recipient, dispatches through the rate-limited
//! channels, and records one alert per attempt.

mod dedup;
mod error;
mod matcher;
mod processor;
mod serve;

pub use dedup::{repeat_key, DedupGate};
pub use error::AlertingError;
pub use matcher::{AlarmMatcher, Recipients, SkipReason};
pub use processor::{Outcome, Processor, Stores, Timeouts};
pub use serve::serve;

use std::future::Future;
use std::time::Duration;

/// Run a collaborator call under a deadline. Expiry becomes [`AlertingError::Timeout`].
pub(crate) async fn with_deadline<T, E, F>(
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T, AlertingError>
where
    F: Future<Output = Result<T, E>>,
    AlertingError: From<E>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result.map_err(AlertingError::from),
        Err(_) => Err(AlertingError::Timeout { operation, after }),
    }
}
