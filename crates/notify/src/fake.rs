//! Credential-free notifier for environments without provider accounts

use crate::{Notifier, NotifyError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Logs notifications instead of delivering them
pub struct FakeNotifier {
    sent: AtomicUsize,
}

impl FakeNotifier {
    pub fn new() -> Self {
        warn!("**********************************************************");
        warn!("* FAKE NOTIFIER IN USE: alerts are logged, NOT delivered *");
        warn!("**********************************************************");
        Self {
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of notifications accepted so far
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Default for FakeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn app(&self, app_key: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(app_key, subject, body, "Fake app notification");
        Ok(())
    }

    async fn sms(&self, phone: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(phone, subject, body, "Fake SMS notification");
        Ok(())
    }

    async fn email(
        &self,
        org_display_name: &str,
        org_email: &str,
        user_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(
            from_name = org_display_name,
            from = org_email,
            to = user_email,
            subject,
            body,
            "Fake email notification"
        );
        Ok(())
    }

    async fn validate_app(&self, app_key: &str) -> Result<(), NotifyError> {
        if app_key.is_empty() || !app_key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(NotifyError::InvalidRecipient(format!("app key {app_key:?}")));
        }
        Ok(())
    }

    async fn validate_sms(&self, phone: &str) -> Result<(), NotifyError> {
        // E.164: leading '+', 8 to 15 digits
        let valid = phone
            .strip_prefix('+')
            .map(|digits| {
                (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false);
        if !valid {
            return Err(NotifyError::InvalidRecipient(format!("phone {phone:?}")));
        }
        Ok(())
    }

    async fn validate_email(&self, email: &str) -> Result<(), NotifyError> {
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            return Err(NotifyError::InvalidRecipient(format!("email {email:?}")));
        }
        Ok(())
    }
}
