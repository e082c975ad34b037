//! Persisted document shapes
//!
//! Checkpoint document:
//!
//! ```json
//! {
//!   "thread_id": "t1", "checkpoint_ns": "", "checkpoint_id": "cp-2",
//!   "parent_checkpoint_id": "cp-1",
//!   "checkpoint": {"bytes": "...", "type": "json"},
//!   "metadata": {"bytes": "...", "type": "json"},
//!   "timestamp": 2000, "source": "loop", "step": 1
//! }
//! ```
//!
//! Write document:
//!
//! ```json
//! {
//!   "thread_id": "t1", "checkpoint_ns": "", "checkpoint_id": "cp-2",
//!   "task_id": "task-a", "idx": 0, "channel": "messages",
//!   "value": {"bytes": "...", "type": "json"},
//!   "timestamp": 2001, "global_index": 1718000000000001
//! }
//! ```

use crate::checkpoint::{CheckpointId, CheckpointSource};
use crate::error::{CheckpointError, Result};
use crate::serializer::Envelope;
use crate::traits::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CheckpointDocument {
    pub thread_id: String,
    pub checkpoint_ns: String,
    pub checkpoint_id: CheckpointId,
    pub parent_checkpoint_id: Option<CheckpointId>,
    pub checkpoint: Envelope,
    pub metadata: Envelope,
    pub timestamp: i64,
    pub source: Option<CheckpointSource>,
    pub step: Option<i32>,
}

/// Fields of a checkpoint document needed to order it
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CheckpointHeader {
    pub checkpoint_id: CheckpointId,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WriteDocument {
    pub thread_id: String,
    pub checkpoint_ns: String,
    pub checkpoint_id: CheckpointId,
    pub task_id: String,
    pub idx: usize,
    pub channel: String,
    pub value: Envelope,
    pub timestamp: i64,
    pub global_index: u64,
}

/// Serialize a document for the backing store
pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    Ok(serde_json::to_value(value)?)
}

/// Read a stored document, reporting malformed shapes as decode errors
pub(crate) fn from_document<T: DeserializeOwned>(key: &str, document: &Document) -> Result<T> {
    T::deserialize(document)
        .map_err(|e| CheckpointError::Decode(format!("malformed document at {key:?}: {e}")))
}
