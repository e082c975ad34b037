//! SQLite document storage
//!
//! [`SqliteDocumentStore`] keeps every document in a single table:
//!
//! ```sql
//! CREATE TABLE checkpoint_documents (
//!     key  TEXT PRIMARY KEY NOT NULL,
//!     body TEXT NOT NULL
//! )
//! ```
//!
//! Bodies are JSON text. Scans walk the primary key in order and use the
//! row offset as cursor. Deletes run in one transaction.

use crate::error::{BackendError, CheckpointError, Result};
use crate::memory::DEFAULT_PAGE_SIZE;
use crate::traits::{Document, DocumentStore, ScanPage};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS checkpoint_documents (
    key  TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
)";

/// Document store backed by a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    page_size: usize,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database at `database_url`
    ///
    /// Accepts the usual sqlx forms, e.g. `sqlite://checkpoints.db` or
    /// `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_page_size(database_url, DEFAULT_PAGE_SIZE).await
    }

    /// Like [`connect`](Self::connect) with a custom scan page size
    pub async fn connect_with_page_size(database_url: &str, page_size: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CheckpointError::Config(format!("invalid database url {database_url:?}: {e}")))?
            .create_if_missing(true);

        // every connection to an in-memory database opens a fresh, empty one
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(CheckpointError::connectivity)?;

        let store = Self::from_pool(pool, page_size);
        store.init().await?;
        tracing::debug!(database_url, "sqlite document store ready");
        Ok(store)
    }

    /// Wrap an existing pool; call [`init`](Self::init) before use
    pub fn from_pool(pool: SqlitePool, page_size: usize) -> Self {
        Self {
            pool,
            page_size: page_size.max(1),
        }
    }

    /// Create the documents table if it does not exist
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(CheckpointError::connectivity)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of stored documents
    pub async fn count(&self) -> Result<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM checkpoint_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(CheckpointError::connectivity)?;
        Ok(result.0)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_document(&self, key: &str) -> std::result::Result<Option<Document>, BackendError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM checkpoint_documents WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        // unparseable bodies come back as a JSON string so readers report a decode error
        Ok(row.map(|(body,)| serde_json::from_str(&body).unwrap_or(Document::String(body))))
    }

    async fn set_document(
        &self,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), BackendError> {
        sqlx::query(
            "INSERT INTO checkpoint_documents (key, body) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body",
        )
        .bind(key)
        .bind(document.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        cursor: u64,
    ) -> std::result::Result<ScanPage, BackendError> {
        let offset = i64::try_from(cursor)?;
        let limit = i64::try_from(self.page_size + 1)?;

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM checkpoint_documents
             WHERE substr(key, 1, length(?)) = ?
             ORDER BY key LIMIT ? OFFSET ?",
        )
        .bind(prefix)
        .bind(prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut keys: Vec<String> = rows.into_iter().map(|(key,)| key).collect();
        if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            Ok(ScanPage {
                cursor: cursor + self.page_size as u64,
                keys,
            })
        } else {
            Ok(ScanPage::last(keys))
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> std::result::Result<(), BackendError> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM checkpoint_documents WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
