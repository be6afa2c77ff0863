//! `SQLite`-backed device storage.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::{DeviceStorage, StorageError, StorageResult};

/// Device storage keeping each key's list as ordered rows.
#[derive(Debug, Clone)]
pub struct SqliteDeviceStorage {
    pool: SqlitePool,
}

impl SqliteDeviceStorage {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> StorageResult<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS items (
                key TEXT NOT NULL,
                position INTEGER NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (key, position)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DeviceStorage for SqliteDeviceStorage {
    async fn list_items(
        &self,
        key: &str,
        offset: usize,
        count: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = count.map_or(Ok(-1), i64::try_from).map_err(overflow)?;
        let offset = i64::try_from(offset).map_err(overflow)?;

        let rows = sqlx::query(
            r"
            SELECT value FROM items
            WHERE key = ?
            ORDER BY position ASC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get("value");
                serde_json::from_str(&raw).map_err(StorageError::from)
            })
            .collect()
    }

    async fn store_list(&self, values: Vec<Value>, key: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM items WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for (position, value) in values.iter().enumerate() {
            let position = i64::try_from(position).map_err(overflow)?;
            sqlx::query("INSERT INTO items (key, position, value) VALUES (?, ?, ?)")
                .bind(key)
                .bind(position)
                .bind(serde_json::to_string(value)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Stored {} value(s) under '{key}'", values.len());
        Ok(())
    }

    async fn remove_list(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM items WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        debug!("Removed '{key}'");
        Ok(())
    }
}

fn overflow(e: std::num::TryFromIntError) -> StorageError {
    StorageError::Backend(format!("offset or count out of range: {e}"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_store_and_list() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();

        storage
            .store_list(vec![json!("bla@blubb.com")], "emailaddress")
            .await
            .unwrap();

        let items = storage.list_items("emailaddress", 0, None).await.unwrap();
        assert_eq!(items, vec![json!("bla@blubb.com")]);
    }

    #[tokio::test]
    async fn test_missing_key_is_empty() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();
        assert!(storage.list_items("nothing", 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_replaces_previous_list() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();

        storage
            .store_list(vec![json!(1), json!(2), json!(3)], "k")
            .await
            .unwrap();
        storage.store_list(vec![json!(4)], "k").await.unwrap();

        assert_eq!(storage.list_items("k", 0, None).await.unwrap(), vec![json!(4)]);
    }

    #[tokio::test]
    async fn test_offset_and_count() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();
        storage
            .store_list(vec![json!("a"), json!("b"), json!("c"), json!("d")], "k")
            .await
            .unwrap();

        let page = storage.list_items("k", 1, Some(2)).await.unwrap();
        assert_eq!(page, vec![json!("b"), json!("c")]);

        let tail = storage.list_items("k", 3, None).await.unwrap();
        assert_eq!(tail, vec![json!("d")]);
    }

    #[tokio::test]
    async fn test_objects_round_trip() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();
        let imap = json!({"host": "mail.blablubb.com", "port": 123, "secure": true, "ca": "PEM"});

        storage.store_list(vec![imap.clone()], "imap").await.unwrap();
        assert_eq!(storage.list_items("imap", 0, None).await.unwrap(), vec![imap]);
    }

    #[tokio::test]
    async fn test_remove_list() {
        let storage = SqliteDeviceStorage::in_memory().await.unwrap();
        storage.store_list(vec![json!("x")], "a").await.unwrap();
        storage.store_list(vec![json!("y")], "b").await.unwrap();

        storage.remove_list("a").await.unwrap();

        assert!(storage.list_items("a", 0, None).await.unwrap().is_empty());
        assert_eq!(storage.list_items("b", 0, None).await.unwrap(), vec![json!("y")]);
    }
}
