//! Storage Layer
//!
//! Read contracts for orgs, alarms and users and the write contract for alerts,
//! with an in-memory repository and a SQLite store behind them.

mod repository;
mod sqlite;

pub use repository::Repository;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use models::{Alarm, Alert, Org, User};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

/// Alarm listing filters. The default lists every alarm in the org.
#[derive(Debug, Clone, Default)]
pub struct AlarmQuery {
    /// Only alarms created after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only alarms with an ID after this one (page cursor)
    pub cursor: Option<String>,
    /// Page size
    pub limit: Option<i64>,
    pub rule_id: Option<String>,
}

impl AlarmQuery {
    /// Every alarm bound to a rule, disabled ones included
    pub fn for_rule(rule_id: &str) -> Self {
        Self {
            rule_id: Some(rule_id.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait OrgStore: Send + Sync {
    async fn read_org(&self, org_id: &str) -> Result<Org, StorageError>;
}

#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// Alarms matching `query` ordered by ID, plus the total count ignoring
    /// cursor and limit
    async fn list_alarms(
        &self,
        org_id: &str,
        query: &AlarmQuery,
    ) -> Result<(Vec<Alarm>, i64), StorageError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Active users in the org carrying at least one of `tags`
    async fn list_users_by_tags(
        &self,
        org_id: &str,
        tags: &[String],
    ) -> Result<Vec<User>, StorageError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StorageError>;
}
