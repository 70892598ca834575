//! SQLite-backed [`KeyValueStore`].
//!
//! Values live in the `kv` table, one row per key. Queries run on the blocking
//! pool so a slow disk never stalls the runtime threads serving the browser.

use crate::db::db::Db;
use crate::libs::store::{KeyValueStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::trace;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::from_db(Db::new()?))
    }

    pub fn from_db(db: Db) -> Self {
        Self {
            conn: Arc::new(Mutex::new(db.conn)),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || op(&conn.lock()))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result?)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        trace!(key = %key, "kv get");
        self.blocking(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let key = key.to_string();
        trace!(key = %key, bytes = value.len(), "kv set");
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_overwrites_existing_value() {
        let store = SqliteStore::from_db(Db::open_in_memory().unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "one".into()).await.unwrap();
        store.set("k", "two".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.get("other").await.unwrap(), None);
    }
}
