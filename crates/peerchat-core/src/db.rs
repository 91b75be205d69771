//! Shared database types and utilities.
//!
//! Provides `StoreError` and the `SQLite` pool constructors used by the
//! message store.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be opened or its schema initialised.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A record with the same natural key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// The on-disk schema is newer than this build understands.
    #[error("Schema version mismatch: store is at v{found}, expected v{expected}")]
    VersionMismatch { found: i64, expected: i64 },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be mapped back into a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::DuplicateKey(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(e.to_string())
            }
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Open (or create) a `SQLite` connection pool at the given file path.
///
/// Creates the parent directory if it does not exist, enables WAL journal
/// mode and sets a 5-second busy timeout so writers to the same table queue
/// up instead of failing.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    info!(path = %path.display(), "Database opened");

    Ok(pool)
}

/// Open an in-memory `SQLite` connection pool (for testing).
///
/// The pool holds exactly one connection that never expires: an in-memory
/// database lives only as long as its connection.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    Ok(pool)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.db");

        let pool = open_pool(&path).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn open_pool_in_memory_works() {
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (id) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();

        let err: StoreError = sqlx::query("INSERT INTO t (id) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }
}
