//! SQLite Store

use crate::{AlarmQuery, AlarmStore, AlertStore, OrgStore, StorageError, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use models::{Alarm, AlarmType, Alert, Org, Status, User};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orgs (
        id TEXT PRIMARY KEY NOT NULL,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS alarms (
        id TEXT PRIMARY KEY NOT NULL,
        org_id TEXT NOT NULL,
        rule_id TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        type TEXT NOT NULL,
        user_tags TEXT NOT NULL,
        subject_template TEXT NOT NULL,
        body_template TEXT NOT NULL,
        repeat_interval INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS alarms_org_rule_idx ON alarms (org_id, rule_id)",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        org_id TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT NOT NULL,
        app_key TEXT NOT NULL,
        status TEXT NOT NULL,
        tags TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        org_id TEXT NOT NULL,
        uniq_id TEXT NOT NULL,
        alarm_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT NOT NULL,
        trace_id TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS alerts_org_uniq_idx ON alerts (org_id, uniq_id, created_at)",
];

const ALARM_FILTER: &str = "org_id = ?1
    AND (?2 IS NULL OR created_at > ?2)
    AND (?3 IS NULL OR rule_id = ?3)";

#[derive(FromRow)]
struct OrgRow {
    id: String,
    display_name: String,
    email: String,
}

#[derive(FromRow)]
struct AlarmRow {
    id: String,
    org_id: String,
    rule_id: String,
    name: String,
    status: String,
    #[sqlx(rename = "type")]
    alarm_type: String,
    user_tags: String,
    subject_template: String,
    body_template: String,
    repeat_interval: i32,
    created_at: i64,
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    org_id: String,
    email: String,
    phone: String,
    app_key: String,
    status: String,
    tags: String,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::SerializationError(format!("bad timestamp {ms}")))
}

fn parse_tags(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn parse_status(raw: &str) -> Result<Status, StorageError> {
    Status::from_str(raw).map_err(|e| StorageError::SerializationError(e.to_string()))
}

impl TryFrom<AlarmRow> for Alarm {
    type Error = StorageError;

    fn try_from(row: AlarmRow) -> Result<Self, Self::Error> {
        Ok(Alarm {
            id: row.id,
            org_id: row.org_id,
            rule_id: row.rule_id,
            name: row.name,
            status: parse_status(&row.status)?,
            alarm_type: AlarmType::from_name(&row.alarm_type),
            user_tags: parse_tags(&row.user_tags)?,
            subject_template: row.subject_template,
            body_template: row.body_template,
            repeat_interval: row.repeat_interval,
            created_at: from_millis(row.created_at)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            org_id: row.org_id,
            email: row.email,
            phone: row.phone,
            app_key: row.app_key,
            status: parse_status(&row.status)?,
            tags: parse_tags(&row.tags)?,
        })
    }
}

/// SQLite-backed store for every collaborator contract
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url`, creating the file if missing, and migrate
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        debug!(database_url, "Connecting to SQLite database");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // In-memory databases are per connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(database_url, "SQLite store ready");
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_org(&self, org: &Org) -> Result<(), StorageError> {
        sqlx::query("INSERT OR REPLACE INTO orgs (id, display_name, email) VALUES (?1, ?2, ?3)")
            .bind(&org.id)
            .bind(&org.display_name)
            .bind(&org.email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_alarm(&self, alarm: &Alarm) -> Result<(), StorageError> {
        let tags = serde_json::to_string(&alarm.user_tags)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO alarms (id, org_id, rule_id, name, status, type, user_tags,
                subject_template, body_template, repeat_interval, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&alarm.id)
        .bind(&alarm.org_id)
        .bind(&alarm.rule_id)
        .bind(&alarm.name)
        .bind(alarm.status.as_str())
        .bind(alarm.alarm_type.as_str())
        .bind(tags)
        .bind(&alarm.subject_template)
        .bind(&alarm.body_template)
        .bind(alarm.repeat_interval)
        .bind(alarm.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let tags = serde_json::to_string(&user.tags)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO users (id, org_id, email, phone, app_key, status, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&user.id)
        .bind(&user.org_id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.app_key)
        .bind(user.status.as_str())
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest alerts for a device, newest first
    pub async fn latest_alerts(
        &self,
        org_id: &str,
        uniq_id: &str,
        limit: i64,
    ) -> Result<Vec<(String, String, String)>, StorageError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT alarm_id, user_id, status FROM alerts
             WHERE org_id = ?1 AND uniq_id = ?2
             ORDER BY created_at DESC, id DESC LIMIT ?3",
        )
        .bind(org_id)
        .bind(uniq_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl OrgStore for SqliteStore {
    async fn read_org(&self, org_id: &str) -> Result<Org, StorageError> {
        let row: OrgRow = sqlx::query_as("SELECT id, display_name, email FROM orgs WHERE id = ?1")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Org {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
        })
    }
}

#[async_trait]
impl AlarmStore for SqliteStore {
    async fn list_alarms(
        &self,
        org_id: &str,
        query: &AlarmQuery,
    ) -> Result<(Vec<Alarm>, i64), StorageError> {
        let since = query.since.map(|s| s.timestamp_millis());

        let rows: Vec<AlarmRow> = sqlx::query_as(&format!(
            "SELECT id, org_id, rule_id, name, status, type, user_tags, subject_template,
                body_template, repeat_interval, created_at
             FROM alarms WHERE {ALARM_FILTER} AND (?4 IS NULL OR id > ?4)
             ORDER BY id LIMIT ?5"
        ))
        .bind(org_id)
        .bind(since)
        .bind(query.rule_id.as_deref())
        .bind(query.cursor.as_deref())
        .bind(query.limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM alarms WHERE {ALARM_FILTER}"))
                .bind(org_id)
                .bind(since)
                .bind(query.rule_id.as_deref())
                .fetch_one(&self.pool)
                .await?;

        let alarms = rows
            .into_iter()
            .map(Alarm::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((alarms, total))
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn list_users_by_tags(
        &self,
        org_id: &str,
        tags: &[String],
    ) -> Result<Vec<User>, StorageError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, org_id, email, phone, app_key, status, tags FROM users
             WHERE org_id = ?1 AND status = ?2 ORDER BY id",
        )
        .bind(org_id)
        .bind(Status::Active.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::new();
        for row in rows {
            let user = User::try_from(row)?;
            if user.has_any_tag(tags) {
                users.push(user);
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl AlertStore for SqliteStore {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO alerts (org_id, uniq_id, alarm_id, user_id, status, error, trace_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&alert.org_id)
        .bind(&alert.uniq_id)
        .bind(&alert.alarm_id)
        .bind(&alert.user_id)
        .bind(alert.status.as_str())
        .bind(&alert.error)
        .bind(&alert.trace_id)
        .bind(alert.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
