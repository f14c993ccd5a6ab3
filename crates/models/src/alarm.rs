//! Alarm Configuration
//!
//! An alarm binds a rule to a notification channel, a set of recipient tags,
//! the subject/body templates and a repeat interval.

use crate::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification channel of an alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmType {
    App,
    Sms,
    Email,
    /// Unset or unrecognized on the wire
    #[default]
    #[serde(other)]
    Unspecified,
}

impl AlarmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::Unspecified => "UNSPECIFIED",
            AlarmType::App => "APP",
            AlarmType::Sms => "SMS",
            AlarmType::Email => "EMAIL",
        }
    }

    /// Parse a stored name; anything unknown maps to `Unspecified`
    pub fn from_name(name: &str) -> Self {
        match name {
            "APP" => AlarmType::App,
            "SMS" => AlarmType::Sms,
            "EMAIL" => AlarmType::Email,
            _ => AlarmType::Unspecified,
        }
    }
}

/// Tenant-configured rule-to-notification binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    pub org_id: String,
    pub rule_id: String,
    #[serde(default)]
    pub name: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub alarm_type: AlarmType,
    #[serde(default)]
    pub user_tags: Vec<String>,
    pub subject_template: String,
    pub body_template: String,
    /// Minutes during which a repeat for the same recipient is suppressed
    pub repeat_interval: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Alarm {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Repeat interval as a cache TTL; negative intervals clamp to zero
    pub fn repeat_ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.repeat_interval).unwrap_or(0) * 60)
    }
}
