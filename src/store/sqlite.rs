//! `SQLite` storage for profile documents.
//!
//! Each profile is one row holding its JSON document body. Batches are
//! staged and written inside a single `SQLite` transaction, so either
//! every document in the batch is updated or none is.
//!
//! `rusqlite` is synchronous; every operation runs on the blocking pool
//! via `tokio::task::spawn_blocking` so async workers never wait on disk.

// SQLite operations need to hold the lock for the duration of the operation.
// Publishing under the lock keeps change events in commit order.
#![allow(clippy::significant_drop_tightening)]

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::batch::{stage, WriteBatch};
use super::error::{StoreError, StoreResult};
use super::feed::{ChangeFeed, ChangeStream, ProfileChange};
use super::ProfileStore;
use crate::profile::{Document, UserId};

/// `SQLite`-based profile document store.
///
/// Thread-safe wrapper around a `SQLite` connection.
pub struct SqliteProfileStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
}

impl SqliteProfileStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or initialized.
    pub fn new(path: &Path) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let inner = SqliteInner {
            conn: Mutex::new(conn),
            feed: ChangeFeed::new(),
        };
        inner.initialize_schema()?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Closes the change feed, ending every subscription.
    pub fn close_feed(&self) {
        self.inner.feed.close();
    }

    /// Runs `op` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteInner) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Storage(format!("Database task failed: {e}")))?
    }
}

impl SqliteInner {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("Failed to acquire database lock: {e}")))
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn get_profile_sync(&self, id: &UserId) -> StoreResult<Option<Document>> {
        let conn = self.lock()?;
        read_document(&conn, id)
    }

    fn create_profile_sync(&self, id: &UserId, doc: &Document) -> StoreResult<()> {
        let conn = self.lock()?;
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().timestamp();

        let rows = conn.execute(
            r"
            INSERT OR IGNORE INTO profiles (id, document, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ",
            params![id.as_str(), &body, now],
        )?;

        if rows == 0 {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        Ok(())
    }

    fn delete_profile_sync(&self, id: &UserId) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM profiles WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    fn list_profile_ids_sync(&self) -> StoreResult<Vec<UserId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM profiles ORDER BY id")?;

        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|id| {
                UserId::new(id)
                    .map_err(|e| StoreError::Storage(format!("Invalid id in database: {e}")))
            })
            .collect()
    }

    fn commit_sync(&self, batch: &WriteBatch) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let staged = stage(batch, |id| read_document(&tx, id))?;

        let now = Utc::now().timestamp();
        for write in &staged {
            let body = serde_json::to_string(&write.after)?;
            tx.execute(
                "UPDATE profiles SET document = ?1, updated_at = ?2 WHERE id = ?3",
                params![&body, now, write.user_id.as_str()],
            )?;
        }
        tx.commit()?;

        let changes: Vec<ProfileChange> = staged
            .into_iter()
            .map(|write| ProfileChange::new(write.user_id, write.before, write.after))
            .collect();
        self.feed.publish(&changes);

        Ok(())
    }
}

fn read_document(conn: &Connection, id: &UserId) -> StoreResult<Option<Document>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT document FROM profiles WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    body.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
        .transpose()
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get_profile(&self, id: &UserId) -> StoreResult<Option<Document>> {
        let id = id.clone();
        self.blocking(move |inner| inner.get_profile_sync(&id)).await
    }

    async fn create_profile(&self, id: &UserId, doc: Document) -> StoreResult<()> {
        let id = id.clone();
        self.blocking(move |inner| inner.create_profile_sync(&id, &doc))
            .await
    }

    async fn delete_profile(&self, id: &UserId) -> StoreResult<()> {
        let id = id.clone();
        self.blocking(move |inner| inner.delete_profile_sync(&id))
            .await
    }

    async fn list_profile_ids(&self) -> StoreResult<Vec<UserId>> {
        self.blocking(SqliteInner::list_profile_ids_sync).await
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        self.blocking(move |inner| inner.commit_sync(&batch)).await
    }

    fn subscribe(&self) -> ChangeStream {
        self.inner.feed.subscribe()
    }
}
