//! SQLite-backed cache shared by every process using the same database file

use crate::{Cache, CacheError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

// Insert, or take over an expired row. A held row leaves zero rows affected.
const SET_IF_ABSENT: &str = "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
WHERE cache_entries.expires_at <= ?4";

/// Cache persisted in a SQLite table
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Connect to `database_url`, creating the file and table if missing
    pub async fn connect(database_url: &str) -> Result<Self, CacheError> {
        debug!(database_url, "Connecting SQLite cache");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // In-memory databases are per connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let cache = Self::with_pool(pool).await?;
        info!(database_url, "SQLite cache ready");
        Ok(cache)
    }

    /// Use an existing pool, creating the table if missing
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Delete expired rows, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Cache for SqliteCache {
    async fn set_if_not_exist_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        let result = sqlx::query(SET_IF_ABSENT)
            .bind(key)
            .bind(value)
            .bind(expires_at)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
