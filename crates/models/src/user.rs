//! Notification Recipients

use crate::Status;
use serde::{Deserialize, Serialize};

/// A user and their per-channel contact endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl User {
    /// True if the user carries any of the given tags
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_any_tag() {
        let user = User {
            id: "u1".to_string(),
            org_id: "o1".to_string(),
            email: "a@b.c".to_string(),
            phone: String::new(),
            app_key: String::new(),
            status: Status::Active,
            tags: vec!["ops".to_string(), "night".to_string()],
        };

        assert!(user.has_any_tag(&["night".to_string()]));
        assert!(!user.has_any_tag(&["dev".to_string()]));
        assert!(!user.has_any_tag(&[]));
    }
}
