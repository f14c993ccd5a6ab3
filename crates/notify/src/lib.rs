//! Notification Dispatch
//!
//! Provides the provider-facing [`Notifier`] collaborator, a credential-free
//! [`FakeNotifier`], and the [`Dispatcher`] that paces every channel through a
//! global cache-held lock before calling the provider.

mod dispatcher;
mod fake;
mod rate_limit;

pub use dispatcher::{truncate, Dispatcher};
pub use fake::FakeNotifier;
pub use rate_limit::{acquire, RateLimitConfig};

use async_trait::async_trait;
use cache::CacheError;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Alarm type is unset or not handled by any channel
    #[error("unknown alarm type: {0}")]
    UnknownAlarmType(String),

    /// Recipient address failed validation
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Provider rejected or failed the send
    #[error("provider error: {0}")]
    Provider(String),

    /// Channel rate-limit lock could not be taken
    #[error("rate limit: {0}")]
    RateLimit(#[from] CacheError),
}

/// Outbound provider for each channel. Implementations perform the raw send;
/// pacing and truncation are applied by [`Dispatcher`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Mobile push to a user's app key
    async fn app(&self, app_key: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    /// Text message to a phone number
    async fn sms(&self, phone: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    /// Email sent on behalf of an org
    async fn email(
        &self,
        org_display_name: &str,
        org_email: &str,
        user_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError>;

    /// Check an app key before it is stored on a user
    async fn validate_app(&self, app_key: &str) -> Result<(), NotifyError>;

    /// Check a phone number before it is stored on a user
    async fn validate_sms(&self, phone: &str) -> Result<(), NotifyError>;

    /// Check an email address before it is stored on a user
    async fn validate_email(&self, email: &str) -> Result<(), NotifyError>;
}
