//! Common test utilities and adapter wrappers

#![allow(dead_code)]

use async_trait::async_trait;
use checkpoint_store::{
    BackendError, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointStore, Document,
    DocumentStore, InMemoryDocumentStore, ScanPage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory adapter that records every bulk delete it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryDocumentStore,
    deletes: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    /// Key lists passed to `delete_keys`, one entry per call
    pub fn deletes(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, BackendError> {
        self.inner.get_document(key).await
    }

    async fn set_document(&self, key: &str, document: Document) -> Result<(), BackendError> {
        self.inner.set_document(key, document).await
    }

    async fn scan_keys(&self, prefix: &str, cursor: u64) -> Result<ScanPage, BackendError> {
        self.inner.scan_keys(prefix, cursor).await
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        self.deletes.lock().unwrap().push(keys.to_vec());
        self.inner.delete_keys(keys).await
    }
}

/// Adapter whose every call fails as if the server were unreachable
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

fn refused() -> BackendError {
    Box::new(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn get_document(&self, _key: &str) -> Result<Option<Document>, BackendError> {
        Err(refused())
    }

    async fn set_document(&self, _key: &str, _document: Document) -> Result<(), BackendError> {
        Err(refused())
    }

    async fn scan_keys(&self, _prefix: &str, _cursor: u64) -> Result<ScanPage, BackendError> {
        Err(refused())
    }

    async fn delete_keys(&self, _keys: &[String]) -> Result<(), BackendError> {
        Err(refused())
    }
}

/// Adapter whose scans return every key twice, spread over two pages
#[derive(Debug, Clone, Default)]
pub struct DuplicatingStore {
    inner: InMemoryDocumentStore,
}

#[async_trait]
impl DocumentStore for DuplicatingStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, BackendError> {
        self.inner.get_document(key).await
    }

    async fn set_document(&self, key: &str, document: Document) -> Result<(), BackendError> {
        self.inner.set_document(key, document).await
    }

    async fn scan_keys(&self, prefix: &str, cursor: u64) -> Result<ScanPage, BackendError> {
        let mut all = Vec::new();
        let mut inner_cursor = 0;
        loop {
            let page = self.inner.scan_keys(prefix, inner_cursor).await?;
            let is_last = page.is_last();
            all.extend(page.keys);
            if is_last {
                break;
            }
            inner_cursor = page.cursor;
        }
        match cursor {
            0 => Ok(ScanPage { cursor: 1, keys: all }),
            _ => Ok(ScanPage::last(all)),
        }
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        self.inner.delete_keys(keys).await
    }
}

/// Store a checkpoint with an explicit timestamp in milliseconds
pub async fn put_at(
    store: &CheckpointStore,
    thread_id: &str,
    namespace: &str,
    checkpoint_id: &str,
    ts: i64,
) -> CheckpointConfig {
    let config = CheckpointConfig::new(thread_id).with_checkpoint_ns(namespace);
    store
        .put(
            &config,
            Checkpoint::empty(checkpoint_id).with_ts_millis(ts),
            CheckpointMetadata::new(),
            HashMap::new(),
        )
        .await
        .expect("put checkpoint")
}
