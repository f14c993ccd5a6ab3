//! Alarm Matcher
//!
//! Decides who an alarm notifies. Disabled alarms and alarms without eligible
//! users are skipped with no side effects. Tag matching and the active-user
//! filter belong to the user store.

use crate::with_deadline;
use models::{Alarm, User};
use std::sync::Arc;
use std::time::Duration;
use storage::UserStore;
use tracing::{debug, warn};

/// Why an alarm produced no notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoUsers,
    UserLookup,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::NoUsers => "no_users",
            SkipReason::UserLookup => "user_lookup",
        }
    }
}

/// Users an alarm should notify, or why it notifies nobody
#[derive(Debug)]
pub enum Recipients {
    Skip(SkipReason),
    Notify(Vec<User>),
}

pub struct AlarmMatcher {
    users: Arc<dyn UserStore>,
    timeout: Duration,
}

impl AlarmMatcher {
    pub fn new(users: Arc<dyn UserStore>, timeout: Duration) -> Self {
        Self { users, timeout }
    }

    /// Resolve the recipients of `alarm`. Lookup failures are logged here and
    /// reported as a skip so the caller moves on to the next alarm.
    pub async fn resolve(&self, alarm: &Alarm) -> Recipients {
        if !alarm.is_active() {
            debug!(alarm_id = %alarm.id, "Alarm disabled");
            return Recipients::Skip(SkipReason::Disabled);
        }

        let lookup = with_deadline(
            "list users",
            self.timeout,
            self.users.list_users_by_tags(&alarm.org_id, &alarm.user_tags),
        )
        .await;

        match lookup {
            Ok(users) if users.is_empty() => {
                debug!(alarm_id = %alarm.id, tags = ?alarm.user_tags, "No users for alarm");
                Recipients::Skip(SkipReason::NoUsers)
            }
            Ok(users) => Recipients::Notify(users),
            Err(e) => {
                warn!(alarm_id = %alarm.id, error = %e, "User lookup failed");
                Recipients::Skip(SkipReason::UserLookup)
            }
        }
    }
}
