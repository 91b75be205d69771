//! Store handle: opening, schema initialisation and version contract.

use std::path::Path;

use sqlx::{Pool, Sqlite};
use tracing::info;

use peerchat_core::config::StoreSettings;
use peerchat_core::db::{self, StoreError};

/// Schema version written by this build's migrations.
pub const SCHEMA_VERSION: i64 = 1;

/// Durable store for chat history and known peers.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct MessageStore {
    pool: Pool<Sqlite>,
    name: String,
    version: i64,
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl MessageStore {
    /// Open or create a store at `path`, expecting schema `version`.
    pub async fn open(path: &Path, name: &str, version: i64) -> Result<Self, StoreError> {
        let pool = db::open_pool(path).await?;
        Self::init(pool, name, version).await
    }

    /// Open the store described by resolved configuration.
    pub async fn from_settings(settings: &StoreSettings) -> Result<Self, StoreError> {
        let path = settings.database_path().ok_or_else(|| {
            StoreError::Unavailable("no data directory for the message store".to_string())
        })?;
        Self::open(&path, &settings.name, settings.version).await
    }

    /// Open an in-memory store (for testing).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = db::open_pool_in_memory().await?;
        Self::init(pool, "memory", SCHEMA_VERSION).await
    }

    async fn init(pool: Pool<Sqlite>, name: &str, version: i64) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("schema initialisation failed: {e}")))?;

        let store = Self {
            pool,
            name: name.to_string(),
            version,
        };
        store.check_version().await?;

        info!(name = %store.name, version = store.version, "Message store ready");
        Ok(store)
    }

    /// Enforce the "open with expected version" contract.
    ///
    /// A missing tag is written, an older tag is raised to the expected
    /// version, and a newer tag is refused.
    async fn check_version(&self) -> Result<(), StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM store_meta WHERE name = ?")
            .bind(&self.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match found {
            None => {
                sqlx::query("INSERT INTO store_meta (name, version) VALUES (?, ?)")
                    .bind(&self.name)
                    .bind(self.version)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
            Some(v) if v == self.version => {}
            Some(v) if v < self.version => {
                sqlx::query("UPDATE store_meta SET version = ? WHERE name = ?")
                    .bind(self.version)
                    .bind(&self.name)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                info!(name = %self.name, from = v, to = self.version, "Store version tag upgraded");
            }
            Some(v) => {
                return Err(StoreError::VersionMismatch {
                    found: v,
                    expected: self.version,
                });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Get a reference to the connection pool.
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool; later operations fail with `Unavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
