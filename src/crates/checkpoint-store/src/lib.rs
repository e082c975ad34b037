//! # checkpoint-store - Versioned Checkpoints over Document Key-Value Engines
//!
//! **Durable execution state for multi-step agent runs.** This crate records a
//! series of checkpoints per conversation thread, buffers the channel writes
//! tasks produce before the next checkpoint, and reads history back newest
//! first. Storage is any engine that can get, set, prefix-scan, and delete JSON
//! documents.
//!
//! ## Core Concepts
//!
//! ### Threads, namespaces, checkpoints
//!
//! A **thread** groups the checkpoints of one run. Within a thread, a
//! **namespace** separates nested subgraphs (the root namespace is `""`). A
//! **checkpoint** is addressed by `(thread_id, checkpoint_ns, checkpoint_id)`;
//! see [`CheckpointConfig`].
//!
//! ### Pending writes
//!
//! Before a checkpoint is finalized, tasks record proposed channel updates with
//! [`CheckpointStore::put_writes`]. Each write carries a `global_index`, and
//! reads return them in that order so replay applies them as they happened.
//!
//! ### Documents and keys
//!
//! Every checkpoint and every write is one document. Keys follow a fixed
//! layout produced by [`KeyCodec`]:
//!
//! ```text
//! {prefix}:{thread}:checkpoint:{ns}:{checkpoint_id}
//! {prefix}:{thread}:write:{ns}:{checkpoint_id}:{task_id}:{idx}
//! ```
//!
//! Reads are prefix scans over that layout, so a thread's documents never need
//! a secondary index.
//!
//! ## Architecture
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────┐
//!  │                   CheckpointStore<V>                   │
//!  │  put · put_writes · get_tuple · list · delete_thread   │
//!  └──────┬──────────────────┬──────────────────┬───────────┘
//!         │ keys             │ payloads         │ documents
//!  ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼────────────┐
//!  │  KeyCodec   │    │  Envelope   │    │ dyn DocumentStore │
//!  └─────────────┘    │ json|binary │    └──────┬────────────┘
//!                     └─────────────┘           │
//!                          ┌────────────────────┼───────────────┐
//!                   ┌──────▼───────┐    ┌───────▼──────┐  ┌─────▼─────┐
//!                   │  In-Memory   │    │    SQLite    │  │  Custom   │
//!                   └──────────────┘    └──────────────┘  └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use checkpoint_store::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, CheckpointStore,
//!     InMemoryDocumentStore,
//! };
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() -> checkpoint_store::Result<()> {
//! let store: CheckpointStore = CheckpointStore::new(InMemoryDocumentStore::new());
//! let config = CheckpointConfig::new("thread-1");
//!
//! let checkpoint = Checkpoint::empty("0001").with_channel_value("messages", serde_json::json!([]));
//! let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input).with_step(-1);
//! store.put(&config, checkpoint, metadata, HashMap::new()).await?;
//!
//! let tuple = store.get_tuple(&config).await?.expect("stored above");
//! assert_eq!(tuple.checkpoint_id(), "0001");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointMetadata`], [`CheckpointConfig`], [`CheckpointTuple`]
//! - [`store`] - [`CheckpointStore`] and [`ListOptions`]
//! - [`traits`] - [`DocumentStore`] adapter contract and [`CheckpointStream`]
//! - [`keys`] - [`KeyCodec`] key layout
//! - [`serializer`] - [`Envelope`] payload encoding
//! - [`config`] - [`StoreConfig`] with YAML loading
//! - [`memory`] - [`InMemoryDocumentStore`]
//! - `sqlite` - `SqliteDocumentStore` (feature `sqlite`, on by default)
//! - [`error`] - [`CheckpointError`]
//!
//! ## Consistency
//!
//! Each document write is atomic on its own; nothing spans documents. Reads
//! scan keys and then fetch documents, so a concurrent writer may or may not be
//! observed, and a document removed in between is treated as absent.

pub mod checkpoint;
pub mod config;
mod document;
pub mod error;
pub mod keys;
pub mod memory;
pub mod serializer;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
    CheckpointMetadata, CheckpointSource, CheckpointTuple, PendingWrite,
};
pub use config::{DecodeErrorPolicy, StoreConfig};
pub use error::{BackendError, CheckpointError, Result};
pub use keys::{DocumentKey, DocumentKind, KeyCodec, DEFAULT_KEY_PREFIX, KEY_DELIMITER};
pub use memory::InMemoryDocumentStore;
pub use serializer::{Envelope, PayloadKind};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;
pub use store::{CheckpointStore, ListOptions};
pub use traits::{CheckpointStream, Document, DocumentStore, ScanPage};
