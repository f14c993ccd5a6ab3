//! Alert Records
//!
//! One record per (event, alarm, user) delivery attempt that passed deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Sent,
    Error,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Sent => "SENT",
            AlertStatus::Error => "ERROR",
        }
    }
}

/// Durable record of a notification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub org_id: String,
    /// Device unique ID the triggering point came from
    pub uniq_id: String,
    pub alarm_id: String,
    pub user_id: String,
    pub status: AlertStatus,
    #[serde(default)]
    pub error: String,
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Build the record for a send outcome; an error message marks it `ERROR`
    pub fn from_outcome(
        org_id: &str,
        uniq_id: &str,
        alarm_id: &str,
        user_id: &str,
        trace_id: &str,
        send_error: Option<String>,
    ) -> Self {
        let (status, error) = match send_error {
            None => (AlertStatus::Sent, String::new()),
            Some(e) => (AlertStatus::Error, e),
        };

        Self {
            org_id: org_id.to_string(),
            uniq_id: uniq_id.to_string(),
            alarm_id: alarm_id.to_string(),
            user_id: user_id.to_string(),
            status,
            error,
            trace_id: trace_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
