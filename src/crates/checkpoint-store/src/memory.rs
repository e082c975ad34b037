//! In-memory document storage for development and testing
//!
//! [`InMemoryDocumentStore`] implements [`DocumentStore`] over an ordered map
//! behind `Arc<RwLock<..>>`. Clones share the same map, so a test can keep a
//! handle to inspect or corrupt documents while a
//! [`CheckpointStore`](crate::store::CheckpointStore) owns another.
//!
//! Scans are paged like a real engine's: the cursor is the offset of the next
//! matching key, and `0` marks the end. A small page size makes multi-page
//! scans easy to exercise.
//!
//! ```rust
//! use checkpoint_store::{DocumentStore, InMemoryDocumentStore};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), checkpoint_store::BackendError> {
//! let store = InMemoryDocumentStore::with_page_size(1);
//! store.set_document("a:1", json!({"n": 1})).await?;
//! store.set_document("a:2", json!({"n": 2})).await?;
//!
//! let first = store.scan_keys("a:", 0).await?;
//! assert_eq!(first.keys, vec!["a:1"]);
//! let second = store.scan_keys("a:", first.cursor).await?;
//! assert_eq!(second.keys, vec!["a:2"]);
//! assert!(second.is_last());
//! # Ok(())
//! # }
//! ```

use crate::error::BackendError;
use crate::traits::{Document, DocumentStore, ScanPage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of keys returned per scan page
pub const DEFAULT_PAGE_SIZE: usize = 100;

type DocumentMap = Arc<RwLock<BTreeMap<String, Document>>>;

/// In-memory document store
///
/// Not persistent; everything is lost when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    documents: DocumentMap,
    page_size: usize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store returning at most `page_size` keys per scan page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            documents: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: page_size.max(1),
        }
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// All keys in lexical order
    pub async fn keys(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    /// Clear all documents
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, BackendError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn set_document(&self, key: &str, document: Document) -> Result<(), BackendError> {
        self.documents.write().await.insert(key.to_string(), document);
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str, cursor: u64) -> Result<ScanPage, BackendError> {
        let offset = usize::try_from(cursor)?;
        let documents = self.documents.read().await;

        let mut keys: Vec<String> = documents
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .skip(offset)
            .take(self.page_size + 1)
            .cloned()
            .collect();

        if keys.len() > self.page_size {
            keys.truncate(self.page_size);
            Ok(ScanPage {
                cursor: (offset + self.page_size) as u64,
                keys,
            })
        } else {
            Ok(ScanPage::last(keys))
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        let mut documents = self.documents.write().await;
        for key in keys {
            documents.remove(key);
        }
        Ok(())
    }
}
