//! Cache gateway: a keyed blob store for serialized hand state.
//!
//! Each table persists its hand under `hand:<table_id>` after every
//! admitted transition and deletes it when the table empties. Entries
//! have no TTL; they live until explicitly deleted. The trait keeps the
//! session layer independent of the backing store — Postgres in
//! production, an in-memory map in test mode and unit tests.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Cache key for a table's hand state.
pub fn hand_key(table_id: &str) -> String {
    format!("hand:{table_id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait HandStore: Send + Sync {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()>;
    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// In-memory store for tests and `MODE=test` runs.
#[derive(Debug, Default)]
pub struct MemoryHandStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl HandStore for MemoryHandStore {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Postgres-backed blob store. One row per key; saves upsert.
pub struct PgHandStore {
    pool: PgPool,
}

impl PgHandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the cache and make sure the backing table exists.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Create the backing table when it does not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hand_blobs (
                key TEXT PRIMARY KEY,
                data BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HandStore for PgHandStore {
    async fn save(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO hand_blobs (key, data, updated_at) VALUES ($1, $2, now())
             ON CONFLICT (key) DO UPDATE SET data = $2, updated_at = now()",
        )
        .bind(key)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT data FROM hand_blobs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("data")))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM hand_blobs WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS one FROM hand_blobs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT key FROM hand_blobs WHERE key LIKE $1 ORDER BY key")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("key")).collect())
    }
}
