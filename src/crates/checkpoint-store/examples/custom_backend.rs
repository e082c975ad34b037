//! Example of plugging a custom document engine into the checkpoint store
//!
//! Any type implementing [`DocumentStore`] can back a [`CheckpointStore`].
//! This one keeps documents in a plain `HashMap` and answers every scan in a
//! single page, which is the smallest adapter that satisfies the contract.
//!
//! Run with `cargo run -p checkpoint-store --example custom_backend`.

use async_trait::async_trait;
use checkpoint_store::{
    BackendError, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource,
    CheckpointStore, Document, DocumentStore, ListOptions, ScanPage,
};
use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct HashMapStore {
    documents: Mutex<HashMap<String, Document>>,
}

impl HashMapStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Document>>, BackendError> {
        self.documents
            .lock()
            .map_err(|_| BackendError::from("document map poisoned"))
    }
}

#[async_trait]
impl DocumentStore for HashMapStore {
    async fn get_document(&self, key: &str) -> Result<Option<Document>, BackendError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_document(&self, key: &str, document: Document) -> Result<(), BackendError> {
        self.lock()?.insert(key.to_string(), document);
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str, _cursor: u64) -> Result<ScanPage, BackendError> {
        let keys = self
            .lock()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(ScanPage::last(keys))
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<(), BackendError> {
        let mut documents = self.lock()?;
        for key in keys {
            documents.remove(key);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> checkpoint_store::Result<()> {
    let store: CheckpointStore = CheckpointStore::new(HashMapStore::default());
    let config = CheckpointConfig::new("demo-thread");

    let mut parent: Option<String> = None;
    for step in 0..3 {
        let id = format!("{step:04}");
        let mut metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(step);
        if let Some(parent_id) = &parent {
            metadata = metadata.with_parent("", parent_id.clone());
        }

        let checkpoint = Checkpoint::empty(id.clone())
            .with_ts_millis(1_700_000_000_000 + i64::from(step) * 1000)
            .with_channel_value("step", serde_json::json!(step));
        let saved = store.put(&config, checkpoint, metadata, HashMap::new()).await?;

        store
            .put_writes(
                &saved,
                vec![("log".to_string(), serde_json::json!(format!("finished step {step}")))],
                "worker",
            )
            .await?;
        parent = Some(id);
    }

    println!("=== History (newest first) ===");
    let history: Vec<_> = store.list("demo-thread", ListOptions::new()).await?.try_collect().await?;
    for tuple in &history {
        println!(
            "{} parent={:?} writes={}",
            tuple.checkpoint_id(),
            tuple.parent_checkpoint_id(),
            tuple.pending_writes.len()
        );
    }

    store.delete_thread("demo-thread").await?;
    println!("\nthread deleted; latest = {:?}", store.get_tuple(&config).await?.map(|t| t.checkpoint.id));
    Ok(())
}
