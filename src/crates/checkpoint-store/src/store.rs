//! Checkpoint store over a document key-value engine
//!
//! [`CheckpointStore`] records successive checkpoints of a thread, buffers
//! pending writes ahead of the next checkpoint, and reads history back newest
//! first. It is built purely on the [`DocumentStore`] contract.
//!
//! # Reads are scan-then-fetch
//!
//! `get_tuple` and `list` first scan keys, classify them with the
//! [`KeyCodec`], then fetch the matching documents. Those are independent
//! reads, so a write landing in between may or may not be observed. A
//! document that disappears between scan and fetch is treated as absent.
//!
//! # Example
//!
//! ```rust
//! use checkpoint_store::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointStore,
//!     InMemoryDocumentStore, ListOptions,
//! };
//! use futures::TryStreamExt;
//! use std::collections::HashMap;
//!
//! # #[tokio::main]
//! # async fn main() -> checkpoint_store::Result<()> {
//! let store: CheckpointStore = CheckpointStore::new(InMemoryDocumentStore::new());
//! let config = CheckpointConfig::new("thread-1");
//!
//! store
//!     .put(&config, Checkpoint::empty("cp-1").with_ts_millis(1000), CheckpointMetadata::new(), HashMap::new())
//!     .await?;
//! let saved = store
//!     .put(&config, Checkpoint::empty("cp-2").with_ts_millis(2000), CheckpointMetadata::new(), HashMap::new())
//!     .await?;
//!
//! store
//!     .put_writes(&saved, vec![("messages".to_string(), serde_json::json!("hi"))], "task-a")
//!     .await?;
//!
//! let latest = store.get_tuple(&config).await?.expect("checkpoint exists");
//! assert_eq!(latest.checkpoint_id(), "cp-2");
//! assert_eq!(latest.pending_writes.len(), 1);
//!
//! let history: Vec<_> = store.list("thread-1", ListOptions::new()).await?.try_collect().await?;
//! assert_eq!(history.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata,
    CheckpointTuple, PendingWrite,
};
use crate::config::{DecodeErrorPolicy, StoreConfig};
use crate::document::{
    from_document, to_document, CheckpointDocument, CheckpointHeader, WriteDocument,
};
use crate::error::{CheckpointError, Result};
use crate::keys::{DocumentKey, KeyCodec};
use crate::serializer::Envelope;
use crate::traits::{CheckpointStream, Document, DocumentStore};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Options for [`CheckpointStore::list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    /// Exact namespace to list; `None` lists every namespace of the thread
    pub namespace: Option<String>,
    /// Only checkpoints strictly older than this one
    pub before: Option<CheckpointId>,
    /// Namespace of the `before` checkpoint, needed when listing every
    /// namespace and the id exists in more than one
    pub before_namespace: Option<String>,
    /// Maximum number of tuples to yield
    pub limit: Option<usize>,
    /// Metadata entries every yielded checkpoint must match
    pub filter: HashMap<String, serde_json::Value>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn before(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.before = Some(checkpoint_id.into());
        self
    }

    /// Like [`before`](Self::before), naming the anchor's namespace
    pub fn before_in(
        mut self,
        namespace: impl Into<String>,
        checkpoint_id: impl Into<CheckpointId>,
    ) -> Self {
        self.before_namespace = Some(namespace.into());
        self.before = Some(checkpoint_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.filter.insert(key.into(), value);
        self
    }
}

/// Source of `global_index` values for pending writes.
///
/// Strictly increasing within the process and never below the wall clock in
/// microseconds, so indices issued by a later process continue above those of
/// an earlier one.
#[derive(Debug, Default)]
struct WriteClock {
    last: AtomicU64,
}

impl WriteClock {
    fn next(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// A checkpoint document fetched during a read, not yet decoded
#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    namespace: String,
    checkpoint_id: CheckpointId,
    timestamp: i64,
    document: Document,
}

/// Versioned checkpoint store
///
/// `V` is the type of pending-write values. It defaults to
/// `serde_json::Value`; types without a JSON form are stored through the
/// binary branch of the [`Envelope`].
pub struct CheckpointStore<V = serde_json::Value> {
    backend: Arc<dyn DocumentStore>,
    codec: KeyCodec,
    config: StoreConfig,
    clock: Arc<WriteClock>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for CheckpointStore<V> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            codec: self.codec.clone(),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            _value: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for CheckpointStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<V> CheckpointStore<V>
where
    V: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
{
    /// Create a store with the default configuration
    pub fn new<B: DocumentStore + 'static>(backend: B) -> Self {
        Self::from_parts(Arc::new(backend), KeyCodec::new(), StoreConfig::default())
    }

    /// Create a store with an explicit configuration
    pub fn with_config<B: DocumentStore + 'static>(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let codec = config.key_codec()?;
        Ok(Self::from_parts(Arc::new(backend), codec, config))
    }

    /// Create a store over a shared adapter
    pub fn from_shared(backend: Arc<dyn DocumentStore>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let codec = config.key_codec()?;
        Ok(Self::from_parts(backend, codec, config))
    }

    fn from_parts(backend: Arc<dyn DocumentStore>, codec: KeyCodec, config: StoreConfig) -> Self {
        Self {
            backend,
            codec,
            config,
            clock: Arc::new(WriteClock::default()),
            _value: PhantomData,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Store a checkpoint, replacing any previous one with the same address
    ///
    /// The parent is taken from `metadata.parents[config.checkpoint_ns]`.
    /// `new_versions` is accepted for callers that track it; the store keeps
    /// the versions inside the checkpoint body only.
    #[tracing::instrument(skip_all, fields(thread_id = %config.thread_id, namespace = %config.checkpoint_ns, checkpoint_id = %checkpoint.id))]
    pub async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig> {
        let key = self
            .codec
            .checkpoint_key(&config.thread_id, &config.checkpoint_ns, &checkpoint.id)?;

        let document = CheckpointDocument {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: checkpoint.id.clone(),
            parent_checkpoint_id: metadata
                .parent_in(&config.checkpoint_ns)
                .map(str::to_string),
            checkpoint: Envelope::dump(&checkpoint)?,
            metadata: Envelope::dump(&metadata)?,
            timestamp: checkpoint.ts_millis(),
            source: metadata.source,
            step: metadata.step,
        };

        self.backend
            .set_document(&key, to_document(&document)?)
            .await
            .map_err(CheckpointError::Connectivity)?;

        tracing::debug!(new_versions = new_versions.len(), "checkpoint stored");

        Ok(CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(checkpoint.id),
        })
    }

    /// Record writes a task produced for the checkpoint addressed by `config`
    ///
    /// The checkpoint does not have to exist yet. Each write is stored under
    /// `(task_id, position)`; resubmitting a position replaces it.
    pub async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, V)>,
        task_id: &str,
    ) -> Result<()> {
        let clock = Arc::clone(&self.clock);
        self.store_writes(config, writes, task_id, move |_| Ok(clock.next()))
            .await
    }

    /// Like [`put_writes`](Self::put_writes) with caller-chosen application
    /// order: write `i` gets `global_index = base + i`
    ///
    /// Fails with [`CheckpointError::Invalid`], storing nothing, when
    /// `base + i` does not fit in a `u64`.
    pub async fn put_writes_with_global_index(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, V)>,
        task_id: &str,
        base: u64,
    ) -> Result<()> {
        self.store_writes(config, writes, task_id, move |idx| {
            u64::try_from(idx)
                .ok()
                .and_then(|idx| base.checked_add(idx))
                .ok_or_else(|| {
                    CheckpointError::Invalid(format!(
                        "global_index overflows u64: base {base} + position {idx}"
                    ))
                })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(thread_id = %config.thread_id, namespace = %config.checkpoint_ns, task_id = %task_id, writes = writes.len()))]
    async fn store_writes<F>(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, V)>,
        task_id: &str,
        global_index: F,
    ) -> Result<()>
    where
        F: Fn(usize) -> Result<u64>,
    {
        let checkpoint_id = config.checkpoint_id.as_deref().ok_or_else(|| {
            CheckpointError::Invalid("checkpoint_id is required to store writes".to_string())
        })?;
        let timestamp = Utc::now().timestamp_millis();

        let mut documents = Vec::with_capacity(writes.len());
        for (idx, (channel, value)) in writes.into_iter().enumerate() {
            let key = self.codec.write_key(
                &config.thread_id,
                &config.checkpoint_ns,
                checkpoint_id,
                task_id,
                idx,
            )?;
            let document = WriteDocument {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: checkpoint_id.to_string(),
                task_id: task_id.to_string(),
                idx,
                channel,
                value: Envelope::dump(&value)?,
                timestamp,
                global_index: global_index(idx)?,
            };
            documents.push((key, to_document(&document)?));
        }

        let backend = &self.backend;
        stream::iter(documents)
            .map(|(key, document)| async move { backend.set_document(&key, document).await })
            .buffered(self.config.fetch_concurrency)
            .try_collect::<Vec<()>>()
            .await
            .map_err(CheckpointError::Connectivity)?;

        tracing::debug!(checkpoint_id, "pending writes stored");
        Ok(())
    }

    /// Fetch just the checkpoint addressed by `config`
    pub async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Fetch a checkpoint with its metadata and pending writes
    ///
    /// Without `config.checkpoint_id` the newest checkpoint of the namespace is
    /// returned (greatest timestamp, ties broken by greatest id). `Ok(None)`
    /// when nothing matches. Undecodable data is always an error here.
    #[tracing::instrument(skip_all, fields(thread_id = %config.thread_id, namespace = %config.checkpoint_ns, checkpoint_id = ?config.checkpoint_id))]
    pub async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple<V>>> {
        let candidate = match &config.checkpoint_id {
            Some(checkpoint_id) => {
                let key = self.codec.checkpoint_key(
                    &config.thread_id,
                    &config.checkpoint_ns,
                    checkpoint_id,
                )?;
                let Some(document) = self.fetch(&key).await? else {
                    return Ok(None);
                };
                let header: CheckpointHeader = from_document(&key, &document)?;
                Candidate {
                    key,
                    namespace: config.checkpoint_ns.clone(),
                    checkpoint_id: checkpoint_id.clone(),
                    timestamp: header.timestamp,
                    document,
                }
            }
            None => {
                let prefix = self
                    .codec
                    .checkpoint_prefix(&config.thread_id, &config.checkpoint_ns)?;
                let keys = self.scan_all(&prefix).await?;
                let candidates = self
                    .load_candidates(self.classify(keys).0, DecodeErrorPolicy::Fail)
                    .await?;
                match candidates.into_iter().next() {
                    Some(candidate) => candidate,
                    None => return Ok(None),
                }
            }
        };

        let writes_prefix = self.codec.writes_prefix(
            &config.thread_id,
            &candidate.namespace,
            &candidate.checkpoint_id,
        )?;
        let write_keys = self.scan_all(&writes_prefix).await?;
        let write_keys = self.classify(write_keys).1.into_values().flatten().collect();

        self.assemble(&config.thread_id, candidate, write_keys, DecodeErrorPolicy::Fail)
            .await
            .map(Some)
    }

    /// Stream a thread's checkpoints, newest first
    ///
    /// Keys are scanned and checkpoint headers fetched before this returns;
    /// bodies are decoded and pending writes fetched as the stream is polled,
    /// so dropping the stream early skips that work. Order is descending by
    /// timestamp, then by checkpoint id, then by namespace. A `before` id that
    /// does not exist produces an empty stream. When every namespace is listed
    /// and the `before` id exists in several of them, the call fails with
    /// [`CheckpointError::Invalid`] unless
    /// [`ListOptions::before_in`] names the namespace.
    #[tracing::instrument(skip(self, options), fields(namespace = ?options.namespace, before = ?options.before, limit = ?options.limit))]
    pub async fn list(&self, thread_id: &str, options: ListOptions) -> Result<CheckpointStream<V>> {
        let prefix = self.codec.thread_prefix(thread_id)?;
        let keys = self.scan_all(&prefix).await?;
        let (checkpoint_keys, mut write_keys) = self.classify(keys);

        let (checkpoint_keys, write_keys) = match &options.namespace {
            Some(namespace) => {
                write_keys.retain(|(ns, _), _| ns == namespace);
                let checkpoint_keys = checkpoint_keys
                    .into_iter()
                    .filter(|(_, ns, _)| ns == namespace)
                    .collect();
                (checkpoint_keys, write_keys)
            }
            None => (checkpoint_keys, write_keys),
        };

        let policy = self.config.decode_errors;
        let mut candidates = self.load_candidates(checkpoint_keys, policy).await?;

        if let Some(before) = &options.before {
            let anchor_ns = options
                .before_namespace
                .as_ref()
                .or(options.namespace.as_ref());
            let bound = {
                let mut anchors = candidates.iter().filter(|c| {
                    &c.checkpoint_id == before && anchor_ns.map_or(true, |ns| &c.namespace == ns)
                });
                match (anchors.next(), anchors.next()) {
                    (Some(_), Some(_)) => {
                        return Err(CheckpointError::Invalid(format!(
                            "checkpoint {before:?} exists in several namespaces; name one with before_in"
                        )))
                    }
                    (Some(anchor), None) => Some((
                        anchor.timestamp,
                        anchor.checkpoint_id.clone(),
                        anchor.namespace.clone(),
                    )),
                    (None, _) => None,
                }
            };
            match bound {
                Some((ts, id, ns)) => candidates.retain(|c| {
                    (c.timestamp, c.checkpoint_id.as_str(), c.namespace.as_str())
                        < (ts, id.as_str(), ns.as_str())
                }),
                None => candidates.clear(),
            }
        }

        tracing::debug!(candidates = candidates.len(), "checkpoints selected");

        Ok(Box::pin(Self::tuple_stream(
            self.clone(),
            thread_id.to_string(),
            candidates,
            write_keys,
            options,
            policy,
        )))
    }

    fn tuple_stream(
        store: Self,
        thread_id: String,
        candidates: Vec<Candidate>,
        mut write_keys: HashMap<(String, CheckpointId), Vec<String>>,
        options: ListOptions,
        policy: DecodeErrorPolicy,
    ) -> impl Stream<Item = Result<CheckpointTuple<V>>> + Send + 'static {
        async_stream::try_stream! {
            let mut yielded = 0usize;
            for candidate in candidates {
                if options.limit.is_some_and(|limit| yielded >= limit) {
                    break;
                }
                let writes = write_keys
                    .remove(&(candidate.namespace.clone(), candidate.checkpoint_id.clone()))
                    .unwrap_or_default();
                let key = candidate.key.clone();

                let tuple = match store.assemble(&thread_id, candidate, writes, policy).await {
                    Ok(tuple) => tuple,
                    Err(err) if err.is_decode() && policy == DecodeErrorPolicy::Skip => {
                        tracing::warn!(%key, error = %err, "skipping undecodable checkpoint");
                        continue;
                    }
                    Err(err) => Err(err)?,
                };

                if !tuple.metadata.matches(&options.filter) {
                    continue;
                }

                yielded += 1;
                yield tuple;
            }
        }
    }

    /// Remove every checkpoint and write of a thread, in all namespaces
    #[tracing::instrument(skip(self))]
    pub async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let prefix = self.codec.thread_prefix(thread_id)?;
        let keys = self.scan_all(&prefix).await?;
        if keys.is_empty() {
            return Ok(());
        }

        self.backend
            .delete_keys(&keys)
            .await
            .map_err(CheckpointError::Connectivity)?;

        tracing::debug!(deleted = keys.len(), "thread deleted");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Document>> {
        self.backend
            .get_document(key)
            .await
            .map_err(CheckpointError::Connectivity)
    }

    /// Collect every key under `prefix`, deduplicated and sorted
    async fn scan_all(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut cursor = 0u64;
        let mut pages = 0usize;
        loop {
            let page = self
                .backend
                .scan_keys(prefix, cursor)
                .await
                .map_err(CheckpointError::Connectivity)?;
            pages += 1;
            keys.extend(page.keys);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        tracing::trace!(prefix, pages, keys = keys.len(), "scan complete");
        Ok(keys.into_iter().collect())
    }

    /// Split scanned keys into checkpoint keys `(key, namespace, id)` and
    /// write keys grouped by `(namespace, checkpoint id)`
    #[allow(clippy::type_complexity)]
    fn classify(
        &self,
        keys: Vec<String>,
    ) -> (
        Vec<(String, String, CheckpointId)>,
        HashMap<(String, CheckpointId), Vec<String>>,
    ) {
        let mut checkpoints = Vec::new();
        let mut writes: HashMap<(String, CheckpointId), Vec<String>> = HashMap::new();
        for key in keys {
            match self.codec.decode(&key) {
                Ok(DocumentKey::Checkpoint {
                    namespace,
                    checkpoint_id,
                    ..
                }) => checkpoints.push((key, namespace, checkpoint_id)),
                Ok(DocumentKey::Write {
                    namespace,
                    checkpoint_id,
                    ..
                }) => writes.entry((namespace, checkpoint_id)).or_default().push(key),
                Err(err) => {
                    tracing::debug!(%key, error = %err, "ignoring foreign key under checkpoint prefix")
                }
            }
        }
        (checkpoints, writes)
    }

    /// Fetch checkpoint documents and order them newest first
    async fn load_candidates(
        &self,
        keys: Vec<(String, String, CheckpointId)>,
        policy: DecodeErrorPolicy,
    ) -> Result<Vec<Candidate>> {
        let backend = &self.backend;
        let fetched: Vec<_> = stream::iter(keys)
            .map(|(key, namespace, checkpoint_id)| async move {
                let document = backend.get_document(&key).await?;
                Ok::<_, crate::error::BackendError>((key, namespace, checkpoint_id, document))
            })
            .buffered(self.config.fetch_concurrency)
            .try_collect()
            .await
            .map_err(CheckpointError::Connectivity)?;

        let mut candidates = Vec::with_capacity(fetched.len());
        for (key, namespace, checkpoint_id, document) in fetched {
            let Some(document) = document else {
                continue;
            };
            match from_document::<CheckpointHeader>(&key, &document) {
                Ok(header) => {
                    if header.checkpoint_id != checkpoint_id {
                        tracing::debug!(%key, stored = %header.checkpoint_id, "checkpoint id differs from key");
                    }
                    candidates.push(Candidate {
                        key,
                        namespace,
                        checkpoint_id,
                        timestamp: header.timestamp,
                        document,
                    });
                }
                Err(err) if policy == DecodeErrorPolicy::Skip => {
                    tracing::warn!(%key, error = %err, "skipping undecodable checkpoint");
                }
                Err(err) => return Err(err),
            }
        }

        candidates.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.checkpoint_id.cmp(&a.checkpoint_id))
                .then_with(|| b.namespace.cmp(&a.namespace))
        });
        Ok(candidates)
    }

    /// Decode a checkpoint document and attach its pending writes
    async fn assemble(
        &self,
        thread_id: &str,
        candidate: Candidate,
        write_keys: Vec<String>,
        policy: DecodeErrorPolicy,
    ) -> Result<CheckpointTuple<V>> {
        let document: CheckpointDocument = from_document(&candidate.key, &candidate.document)?;
        let checkpoint: Checkpoint = document.checkpoint.load().map_err(|e| in_key(&candidate.key, e))?;
        let metadata: CheckpointMetadata =
            document.metadata.load().map_err(|e| in_key(&candidate.key, e))?;
        let pending_writes = self.load_writes(write_keys, policy).await?;

        let parent_config = document
            .parent_checkpoint_id
            .map(|parent_id| CheckpointConfig {
                thread_id: thread_id.to_string(),
                checkpoint_ns: candidate.namespace.clone(),
                checkpoint_id: Some(parent_id),
            });

        Ok(CheckpointTuple {
            config: CheckpointConfig {
                thread_id: thread_id.to_string(),
                checkpoint_ns: candidate.namespace,
                checkpoint_id: Some(candidate.checkpoint_id),
            },
            checkpoint,
            metadata,
            parent_config,
            pending_writes,
        })
    }

    /// Fetch and decode write documents, ordered by `global_index`
    async fn load_writes(
        &self,
        keys: Vec<String>,
        policy: DecodeErrorPolicy,
    ) -> Result<Vec<PendingWrite<V>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let backend = &self.backend;
        let fetched: Vec<_> = stream::iter(keys)
            .map(|key| async move {
                let document = backend.get_document(&key).await?;
                Ok::<_, crate::error::BackendError>((key, document))
            })
            .buffered(self.config.fetch_concurrency)
            .try_collect()
            .await
            .map_err(CheckpointError::Connectivity)?;

        let mut writes = Vec::with_capacity(fetched.len());
        for (key, document) in fetched {
            let Some(document) = document else {
                continue;
            };
            match decode_write::<V>(&key, &document) {
                Ok(write) => writes.push(write),
                Err(err) if policy == DecodeErrorPolicy::Skip => {
                    tracing::warn!(%key, error = %err, "skipping undecodable pending write");
                }
                Err(err) => return Err(err),
            }
        }

        writes.sort_by(|a, b| {
            a.global_index
                .cmp(&b.global_index)
                .then_with(|| a.task_id.cmp(&b.task_id))
                .then_with(|| a.index.cmp(&b.index))
        });
        Ok(writes)
    }
}

fn decode_write<V: DeserializeOwned>(key: &str, document: &Document) -> Result<PendingWrite<V>> {
    let stored: WriteDocument = from_document(key, document)?;
    let value = stored.value.load().map_err(|e| in_key(key, e))?;
    Ok(PendingWrite {
        task_id: stored.task_id,
        index: stored.idx,
        channel: stored.channel,
        kind: stored.value.kind(),
        value,
        timestamp: stored.timestamp,
        global_index: stored.global_index,
    })
}

/// Name the offending key in a decode error
fn in_key(key: &str, err: CheckpointError) -> CheckpointError {
    match err {
        CheckpointError::Decode(msg) => CheckpointError::Decode(format!("{key:?}: {msg}")),
        other => other,
    }
}
