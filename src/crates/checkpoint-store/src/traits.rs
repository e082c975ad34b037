//! Backing-store adapter contract
//!
//! [`CheckpointStore`](crate::store::CheckpointStore) is written against the
//! four operations of [`DocumentStore`] and nothing else, so any document-style
//! key-value engine can back it: Redis with JSON documents, SQLite, an
//! in-process map, or a custom service.
//!
//! # Contract
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | `get_document` | `Ok(None)` when the key is absent |
//! | `set_document` | insert or replace |
//! | `scan_keys` | cursor-based prefix scan; cursor `0` starts a scan and a returned cursor of `0` ends it |
//! | `delete_keys` | remove every listed key; missing keys are ignored |
//!
//! A scan must terminate. It may return a key more than once across pages and
//! may or may not observe keys written while it runs; the store deduplicates.
//!
//! Failures are reported as [`BackendError`] and reach callers as
//! [`CheckpointError::Connectivity`](crate::error::CheckpointError::Connectivity).
//! The store never retries; retry and backoff belong to the adapter's client.
//!
//! # Implementing an adapter
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use checkpoint_store::{BackendError, Document, DocumentStore, ScanPage};
//!
//! struct RedisJsonStore {
//!     conn: redis::aio::ConnectionManager,
//! }
//!
//! #[async_trait]
//! impl DocumentStore for RedisJsonStore {
//!     async fn get_document(&self, key: &str) -> Result<Option<Document>, BackendError> {
//!         let raw: Option<String> = redis::cmd("JSON.GET").arg(key).query_async(&mut self.conn.clone()).await?;
//!         Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
//!     }
//!
//!     async fn set_document(&self, key: &str, document: Document) -> Result<(), BackendError> {
//!         redis::cmd("JSON.SET").arg(key).arg("$").arg(document.to_string())
//!             .query_async(&mut self.conn.clone()).await?;
//!         Ok(())
//!     }
//!
//!     async fn scan_keys(&self, prefix: &str, cursor: u64) -> Result<ScanPage, BackendError> {
//!         // prefix must be glob-escaped before appending '*'
//!         let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN").arg(cursor)
//!             .arg("MATCH").arg(format!("{}*", escape_glob(prefix)))
//!             .query_async(&mut self.conn.clone()).await?;
//!         Ok(ScanPage { cursor, keys })
//!     }
//!
//!     async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
//!         redis::cmd("DEL").arg(keys).query_async(&mut self.conn.clone()).await?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::checkpoint::CheckpointTuple;
use crate::error::{BackendError, Result};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// A stored document
pub type Document = serde_json::Value;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream<V = serde_json::Value> =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple<V>>> + Send + 'static>>;

/// One page of a key scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next page; `0` once the scan is complete
    pub cursor: u64,
    /// Keys on this page
    pub keys: Vec<String>,
}

impl ScanPage {
    pub fn last(keys: Vec<String>) -> Self {
        Self { cursor: 0, keys }
    }

    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Minimal document key-value engine consumed by the checkpoint store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document
    async fn get_document(&self, key: &str) -> std::result::Result<Option<Document>, BackendError>;

    /// Insert or replace one document
    async fn set_document(&self, key: &str, document: Document)
        -> std::result::Result<(), BackendError>;

    /// Return one page of keys starting with `prefix`
    async fn scan_keys(&self, prefix: &str, cursor: u64)
        -> std::result::Result<ScanPage, BackendError>;

    /// Remove the given keys
    async fn delete_keys(&self, keys: &[String]) -> std::result::Result<(), BackendError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn get_document(&self, key: &str) -> std::result::Result<Option<Document>, BackendError> {
        (**self).get_document(key).await
    }

    async fn set_document(
        &self,
        key: &str,
        document: Document,
    ) -> std::result::Result<(), BackendError> {
        (**self).set_document(key, document).await
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        cursor: u64,
    ) -> std::result::Result<ScanPage, BackendError> {
        (**self).scan_keys(prefix, cursor).await
    }

    async fn delete_keys(&self, keys: &[String]) -> std::result::Result<(), BackendError> {
        (**self).delete_keys(keys).await
    }
}
