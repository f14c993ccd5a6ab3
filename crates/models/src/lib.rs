//! Alerter Data Model
//!
//! Inbound device events, tenant alarm configuration, and outbound alert records.

mod alarm;
mod alert;
mod error;
mod event;
mod org;
mod user;

pub use alarm::{Alarm, AlarmType};
pub use alert::{Alert, AlertStatus};
pub use error::ModelError;
pub use event::{decode_event, Decoded, Device, Event, EventMessage, Point, PointValue, Rule, PRIME_PAYLOAD};
pub use org::Org;
pub use user::User;

use serde::{Deserialize, Serialize};

/// Lifecycle status shared by alarms and users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Active,
    Disabled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Disabled => "DISABLED",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Status::Active),
            "DISABLED" => Ok(Status::Disabled),
            other => Err(ModelError::InvalidFormat(format!("unknown status {other}"))),
        }
    }
}
