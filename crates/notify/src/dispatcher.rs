//! Per-Channel Dispatch

use crate::{acquire, Notifier, NotifyError, RateLimitConfig};
use cache::Cache;
use models::{AlarmType, Org, User};
use std::sync::Arc;
use tracing::debug;

/// Push title limit
const APP_MAX_SUBJECT: usize = 250;
/// Push message limit
const APP_MAX_BODY: usize = 1024;
/// SMS subject is sent as a single-segment header
const SMS_MAX_SUBJECT: usize = 160;
/// Provider hard limit for a concatenated SMS
const SMS_MAX_BODY: usize = 1600;

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Routes a rendered alert to the channel named by the alarm type
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    cache: Arc<dyn Cache>,
    limits: RateLimitConfig,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, cache: Arc<dyn Cache>, limits: RateLimitConfig) -> Self {
        Self {
            notifier,
            cache,
            limits,
        }
    }

    /// Send one notification to `user` over the alarm's channel.
    ///
    /// Truncates to channel limits, waits for the channel's global rate-limit
    /// lock, then calls the provider. Provider errors are returned unchanged.
    pub async fn send(
        &self,
        alarm_type: AlarmType,
        org: &Org,
        user: &User,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let (key, hold) = self
            .limits
            .channel(alarm_type)
            .ok_or_else(|| NotifyError::UnknownAlarmType(alarm_type.as_str().to_string()))?;

        let (subject, body) = match alarm_type {
            AlarmType::App => (truncate(subject, APP_MAX_SUBJECT), truncate(body, APP_MAX_BODY)),
            AlarmType::Sms => (truncate(subject, SMS_MAX_SUBJECT), truncate(body, SMS_MAX_BODY)),
            _ => (subject, body),
        };

        acquire(self.cache.as_ref(), key, hold).await?;
        debug!(alarm_type = alarm_type.as_str(), user_id = %user.id, "Dispatching notification");

        match alarm_type {
            AlarmType::App => self.notifier.app(&user.app_key, subject, body).await,
            AlarmType::Sms => self.notifier.sms(&user.phone, subject, body).await,
            AlarmType::Email => {
                self.notifier
                    .email(&org.display_name, &org.email, &user.email, subject, body)
                    .await
            }
            AlarmType::Unspecified => Err(NotifyError::UnknownAlarmType(
                alarm_type.as_str().to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNotifier;
    use cache::MemoryCache;
    use models::Status;
    use std::time::Duration;
    use tokio::time::Instant;

    fn org() -> Org {
        Org {
            id: "org-1".to_string(),
            display_name: "Acme".to_string(),
            email: "acme@example.com".to_string(),
        }
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            org_id: "org-1".to_string(),
            email: "ops@example.com".to_string(),
            phone: "+15125551212".to_string(),
            app_key: "appkey".to_string(),
            status: Status::Active,
            tags: vec![],
        }
    }

    fn dispatcher(notifier: MockNotifier) -> Dispatcher {
        Dispatcher::new(
            Arc::new(notifier),
            Arc::new(MemoryCache::new()),
            RateLimitConfig::default(),
        )
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("", 0), "");
    }

    #[tokio::test]
    async fn test_app_uses_app_key() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_app()
            .withf(|key, subject, body| key == "appkey" && subject == "subj" && body == "body")
            .times(1)
            .returning(|_, _, _| Ok(()));

        dispatcher(notifier)
            .send(AlarmType::App, &org(), &user(), "subj", "body")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_email_uses_org_sender() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_email()
            .withf(|name, from, to, _, _| {
                name == "Acme" && from == "acme@example.com" && to == "ops@example.com"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        dispatcher(notifier)
            .send(AlarmType::Email, &org(), &user(), "subj", "body")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sms_truncated() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_sms()
            .withf(|phone, subject, body| {
                phone == "+15125551212"
                    && subject.chars().count() == SMS_MAX_SUBJECT
                    && body.chars().count() == SMS_MAX_BODY
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let long = "x".repeat(5000);
        dispatcher(notifier)
            .send(AlarmType::Sms, &org(), &user(), &long, &long)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_type_never_reaches_provider() {
        let notifier = MockNotifier::new();

        let result = dispatcher(notifier)
            .send(AlarmType::Unspecified, &org(), &user(), "s", "b")
            .await;
        assert!(matches!(result, Err(NotifyError::UnknownAlarmType(_))));
    }

    #[tokio::test]
    async fn test_provider_error_returned_unchanged() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_app()
            .returning(|_, _, _| Err(NotifyError::Provider("quota exceeded".to_string())));

        let result = dispatcher(notifier)
            .send(AlarmType::App, &org(), &user(), "s", "b")
            .await;
        match result {
            Err(NotifyError::Provider(msg)) => assert_eq!(msg, "quota exceeded"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_sends_are_paced() {
        let mut notifier = MockNotifier::new();
        notifier.expect_app().times(3).returning(|_, _, _| Ok(()));
        let dispatcher = dispatcher(notifier);
        let start = Instant::now();

        for _ in 0..3 {
            dispatcher
                .send(AlarmType::App, &org(), &user(), "s", "b")
                .await
                .unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
