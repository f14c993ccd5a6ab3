//! Organization (tenant)

use serde::{Deserialize, Serialize};

/// Tenant owning devices, rules and alarms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Org {
    pub id: String,
    /// Used as the sender display name on email alerts
    pub display_name: String,
    /// Used to derive the sender address on email alerts
    pub email: String,
}
