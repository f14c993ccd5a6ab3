//! Alerting error types

use cache::CacheError;
use models::ModelError;
use notify::NotifyError;
use queue::QueueError;
use rules::RuleError;
use std::time::Duration;
use storage::StorageError;
use thiserror::Error;

/// Errors surfaced while processing an event.
///
/// Wrapped collaborator errors display unchanged so that an alert's error
/// string is exactly what the collaborator reported.
#[derive(Debug, Error)]
pub enum AlertingError {
    #[error(transparent)]
    Decode(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Render(#[from] RuleError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}
