//! SQLite implementation of the reward stores.
//!
//! One pool backs all three store traits. Multi-statement mutations run
//! under `BEGIN IMMEDIATE`, which takes the write lock up front so that two
//! concurrent credits for the same key serialize instead of deadlocking on
//! lock upgrade.

mod ledger_store;
mod referral_store;
mod shop_store;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::schema::CREATE_TABLES;
use super::{Result, StoreError};

/// SQLite-backed reward store.
pub struct SqliteRewardStore {
    pool: SqlitePool,
}

impl SqliteRewardStore {
    /// Create a new SQLite reward store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await?;

        for ddl in CREATE_TABLES {
            sqlx::query(ddl).execute(&self.pool).await?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire a connection and open a write transaction on it.
    async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(conn)
    }
}

/// Commit on success, roll back on failure, and pass the result through.
async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(value)
        }
        Err(e) => {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            Err(e)
        }
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("uuid '{value}': {e}")))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{value}': {e}")))
}

#[cfg(test)]
pub(crate) async fn test_store() -> std::sync::Arc<SqliteRewardStore> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("failed to create in-memory pool");

    let store = std::sync::Arc::new(SqliteRewardStore::new(pool));
    store.init_schema().await.expect("failed to init schema");
    store
}
