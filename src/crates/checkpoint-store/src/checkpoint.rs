//! Checkpoint data structures
//!
//! This module defines the values the store persists and returns:
//!
//! - [`Checkpoint`] - snapshot of execution state at one step
//! - [`CheckpointMetadata`] - source, step and parent links of a snapshot
//! - [`CheckpointConfig`] - the `(thread_id, checkpoint_ns, checkpoint_id)` address
//! - [`PendingWrite`] - a channel write proposed by a task ahead of the next snapshot
//! - [`CheckpointTuple`] - read model combining all of the above
//!
//! The store treats channel values and metadata as opaque: nothing here is
//! interpreted beyond the fields needed for addressing and ordering.
//!
//! # Parents
//!
//! `metadata.parents` maps a namespace to the checkpoint id that precedes this
//! one in that namespace. On `put`, the entry for the checkpoint's own
//! namespace becomes the tuple's `parent_config`:
//!
//! ```rust
//! use checkpoint_store::{CheckpointMetadata, CheckpointSource};
//!
//! let metadata = CheckpointMetadata::new()
//!     .with_source(CheckpointSource::Loop)
//!     .with_step(3)
//!     .with_parent("", "cp-0002");
//!
//! assert_eq!(metadata.parent_in(""), Some("cp-0002"));
//! assert_eq!(metadata.parent_in("subgraph"), None);
//! ```

use crate::serializer::PayloadKind;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Checkpoint ID type
///
/// Assigned by the caller. Ids are expected to sort in creation order; the
/// store relies on that only to break timestamp ties.
pub type CheckpointId = String;

/// Channel version type - can be int, float, or string
///
/// Human-readable formats store the bare number or string. Binary formats
/// also store the variant, since they cannot infer it on the way back.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UntaggedVersion {
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Deserialize)]
#[serde(rename = "ChannelVersion")]
enum TaggedVersion {
    Int(i64),
    Float(f64),
    String(String),
}

impl Serialize for ChannelVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            return match self {
                ChannelVersion::Int(v) => serializer.serialize_i64(*v),
                ChannelVersion::Float(v) => serializer.serialize_f64(*v),
                ChannelVersion::String(v) => serializer.serialize_str(v),
            };
        }
        match self {
            ChannelVersion::Int(v) => {
                serializer.serialize_newtype_variant("ChannelVersion", 0, "Int", v)
            }
            ChannelVersion::Float(v) => {
                serializer.serialize_newtype_variant("ChannelVersion", 1, "Float", v)
            }
            ChannelVersion::String(v) => {
                serializer.serialize_newtype_variant("ChannelVersion", 2, "String", v)
            }
        }
    }
}

impl<'de> Deserialize<'de> for ChannelVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            return Ok(match UntaggedVersion::deserialize(deserializer)? {
                UntaggedVersion::Int(v) => ChannelVersion::Int(v),
                UntaggedVersion::Float(v) => ChannelVersion::Float(v),
                UntaggedVersion::String(v) => ChannelVersion::String(v),
            });
        }
        Ok(match TaggedVersion::deserialize(deserializer)? {
            TaggedVersion::Int(v) => ChannelVersion::Int(v),
            TaggedVersion::Float(v) => ChannelVersion::Float(v),
            TaggedVersion::String(v) => ChannelVersion::String(v),
        })
    }
}

impl ChannelVersion {
    /// Next version for numeric variants; string versions are managed by the caller
    pub fn next(&self) -> Option<Self> {
        match self {
            ChannelVersion::Int(v) => Some(ChannelVersion::Int(v + 1)),
            ChannelVersion::Float(v) => Some(ChannelVersion::Float(v + 1.0)),
            ChannelVersion::String(_) => None,
        }
    }
}

/// Mapping from channel name to version
pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// How a checkpoint came to exist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Created from the input of an invocation
    Input,
    /// Created inside the execution loop
    Loop,
    /// Created from a manual state update
    Update,
    /// Created as a copy of another checkpoint
    Fork,
}

impl CheckpointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointSource::Input => "input",
            CheckpointSource::Loop => "loop",
            CheckpointSource::Update => "update",
            CheckpointSource::Fork => "fork",
        }
    }
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// The step number of the checkpoint
    /// -1 for the first "input" checkpoint
    /// 0 for the first "loop" checkpoint
    /// n for the nth checkpoint afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Namespace to parent checkpoint id
    #[serde(default)]
    pub parents: HashMap<String, CheckpointId>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_parents(mut self, parents: HashMap<String, CheckpointId>) -> Self {
        self.parents = parents;
        self
    }

    /// Record the parent checkpoint within one namespace
    pub fn with_parent(
        mut self,
        namespace: impl Into<String>,
        checkpoint_id: impl Into<CheckpointId>,
    ) -> Self {
        self.parents.insert(namespace.into(), checkpoint_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parent checkpoint id recorded for `namespace`
    pub fn parent_in(&self, namespace: &str) -> Option<&str> {
        self.parents.get(namespace).map(String::as_str)
    }

    /// Whether every entry of `filter` matches this metadata
    ///
    /// `source` and `step` compare against the typed fields; any other key
    /// compares against `extra`. An empty filter matches everything.
    pub fn matches(&self, filter: &HashMap<String, serde_json::Value>) -> bool {
        filter.iter().all(|(key, expected)| match key.as_str() {
            "source" => self.source.map(|s| s.as_str()) == expected.as_str(),
            "step" => self.step.map(i64::from) == expected.as_i64(),
            _ => self.extra.get(key) == Some(expected),
        })
    }
}

/// State snapshot at a given point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// The version of the checkpoint format
    pub v: i32,

    /// Caller-assigned id, unique within `(thread_id, checkpoint_ns)`
    pub id: CheckpointId,

    /// The timestamp of the checkpoint; drives `list` ordering
    pub ts: DateTime<Utc>,

    /// Mapping from channel name to channel snapshot value
    #[serde(with = "channel_values_text")]
    pub channel_values: HashMap<String, serde_json::Value>,

    /// The versions of the channels at the time of the checkpoint
    pub channel_versions: ChannelVersions,

    /// Map from node ID to map from channel name to version seen
    pub versions_seen: HashMap<String, ChannelVersions>,

    /// The channels that were updated in this checkpoint
    #[serde(default)]
    pub updated_channels: Option<Vec<String>>,
}

impl Checkpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: i32 = 1;

    /// Create a checkpoint stamped with the current time
    pub fn new(
        id: impl Into<CheckpointId>,
        channel_values: HashMap<String, serde_json::Value>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: id.into(),
            ts: Utc::now(),
            channel_values,
            channel_versions,
            versions_seen,
            updated_channels: None,
        }
    }

    /// Create a checkpoint with no channel state
    pub fn empty(id: impl Into<CheckpointId>) -> Self {
        Self::new(id, HashMap::new(), HashMap::new(), HashMap::new())
    }

    /// Override the timestamp
    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    /// Override the timestamp with milliseconds since the Unix epoch
    ///
    /// Values outside the range `DateTime<Utc>` can represent are clamped to
    /// its first or last instant, so ordering still follows `millis`.
    pub fn with_ts_millis(mut self, millis: i64) -> Self {
        self.ts = Utc.timestamp_millis_opt(millis).single().unwrap_or(if millis < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        self
    }

    pub fn with_channel_value(mut self, channel: impl Into<String>, value: serde_json::Value) -> Self {
        self.channel_values.insert(channel.into(), value);
        self
    }

    /// Set the updated channels
    pub fn with_updated_channels(mut self, channels: Vec<String>) -> Self {
        self.updated_channels = Some(channels);
        self
    }

    /// Timestamp used for ordering, in milliseconds since the Unix epoch
    pub fn ts_millis(&self) -> i64 {
        self.ts.timestamp_millis()
    }
}

/// Address of a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub struct CheckpointConfig {
    /// Thread grouping related checkpoints
    pub thread_id: String,

    /// Namespace within the thread; empty for the root
    #[serde(default)]
    pub checkpoint_ns: String,

    /// Specific checkpoint; `None` addresses the latest one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,
}

impl CheckpointConfig {
    /// Address the root namespace of a thread
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: String::new(),
            checkpoint_id: None,
        }
    }

    pub fn with_checkpoint_ns(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = checkpoint_ns.into();
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// A channel write proposed by a task before its checkpoint is finalized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingWrite<V = serde_json::Value> {
    pub task_id: String,
    /// Position of the write within the task's batch
    pub index: usize,
    pub channel: String,
    pub value: V,
    /// Encoder used when the value was stored
    pub kind: PayloadKind,
    /// Milliseconds since the Unix epoch at which the write was stored
    pub timestamp: i64,
    /// Store-wide application order
    pub global_index: u64,
}

/// A checkpoint together with everything recorded about it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointTuple<V = serde_json::Value> {
    /// Address of this checkpoint (always carries a checkpoint id)
    pub config: CheckpointConfig,

    pub checkpoint: Checkpoint,

    pub metadata: CheckpointMetadata,

    /// Address of the parent checkpoint in the same namespace, if any
    pub parent_config: Option<CheckpointConfig>,

    /// Writes recorded against this checkpoint, ordered by `global_index`
    pub pending_writes: Vec<PendingWrite<V>>,
}

impl<V> CheckpointTuple<V> {
    pub fn thread_id(&self) -> &str {
        &self.config.thread_id
    }

    pub fn namespace(&self) -> &str {
        &self.config.checkpoint_ns
    }

    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint.id
    }

    pub fn parent_checkpoint_id(&self) -> Option<&str> {
        self.parent_config
            .as_ref()
            .and_then(|config| config.checkpoint_id.as_deref())
    }
}

/// Binary encoders cannot read `serde_json::Value` back, so there the channel
/// values travel as a single JSON string.
mod channel_values_text {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        values: &HashMap<String, serde_json::Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            return values.serialize(serializer);
        }
        let text = serde_json::to_string(values).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, serde_json::Value>, D::Error> {
        if deserializer.is_human_readable() {
            return HashMap::deserialize(deserializer);
        }
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(serde::de::Error::custom)
    }
}
