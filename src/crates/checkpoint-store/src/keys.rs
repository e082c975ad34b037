//! Canonical document keys for checkpoints and pending writes
//!
//! Every document the store persists lives under a key built by [`KeyCodec`]:
//!
//! ```text
//! {prefix}:{thread_id}:checkpoint:{namespace}:{checkpoint_id}
//! {prefix}:{thread_id}:write:{namespace}:{checkpoint_id}:{task_id}:{idx}
//! ```
//!
//! The thread id comes right after the prefix so that one prefix scan covers a
//! whole thread (all namespaces, both document kinds). Keys carry no ordering
//! meaning; `list` orders by the timestamp stored inside each document.
//!
//! Components must not contain the `:` delimiter. The namespace may be empty
//! (the root namespace), which yields two adjacent delimiters.

use crate::checkpoint::CheckpointId;
use crate::error::{CheckpointError, Result};
use std::fmt;

/// Separator between key components
pub const KEY_DELIMITER: char = ':';

/// Prefix used when the configuration does not override it
pub const DEFAULT_KEY_PREFIX: &str = "checkpoint";

const CHECKPOINT_KIND: &str = "checkpoint";
const WRITE_KIND: &str = "write";

/// The two document kinds the store writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Checkpoint,
    Write,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Checkpoint => CHECKPOINT_KIND,
            DocumentKind::Write => WRITE_KIND,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key split back into its components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    Checkpoint {
        thread_id: String,
        namespace: String,
        checkpoint_id: CheckpointId,
    },
    Write {
        thread_id: String,
        namespace: String,
        checkpoint_id: CheckpointId,
        task_id: String,
        index: usize,
    },
}

impl DocumentKey {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentKey::Checkpoint { .. } => DocumentKind::Checkpoint,
            DocumentKey::Write { .. } => DocumentKind::Write,
        }
    }

    pub fn thread_id(&self) -> &str {
        match self {
            DocumentKey::Checkpoint { thread_id, .. } | DocumentKey::Write { thread_id, .. } => {
                thread_id
            }
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            DocumentKey::Checkpoint { namespace, .. } | DocumentKey::Write { namespace, .. } => {
                namespace
            }
        }
    }

    pub fn checkpoint_id(&self) -> &str {
        match self {
            DocumentKey::Checkpoint { checkpoint_id, .. }
            | DocumentKey::Write { checkpoint_id, .. } => checkpoint_id,
        }
    }

    /// True when this key belongs to the given checkpoint coordinates
    pub fn belongs_to(&self, thread_id: &str, namespace: &str, checkpoint_id: &str) -> bool {
        self.thread_id() == thread_id
            && self.namespace() == namespace
            && self.checkpoint_id() == checkpoint_id
    }
}

/// Encodes and decodes document keys under a fixed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl KeyCodec {
    /// Create a codec with the default prefix
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with a custom prefix
    ///
    /// The prefix must be non-empty and free of the delimiter.
    pub fn with_prefix(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        require_token("key prefix", &prefix)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of a checkpoint document
    pub fn checkpoint_key(
        &self,
        thread_id: &str,
        namespace: &str,
        checkpoint_id: &str,
    ) -> Result<String> {
        require_token("thread id", thread_id)?;
        require_delimiter_free("namespace", namespace)?;
        require_token("checkpoint id", checkpoint_id)?;
        Ok(format!(
            "{}:{}:{}:{}:{}",
            self.prefix, thread_id, CHECKPOINT_KIND, namespace, checkpoint_id
        ))
    }

    /// Key of one pending-write document
    pub fn write_key(
        &self,
        thread_id: &str,
        namespace: &str,
        checkpoint_id: &str,
        task_id: &str,
        index: usize,
    ) -> Result<String> {
        require_token("thread id", thread_id)?;
        require_delimiter_free("namespace", namespace)?;
        require_token("checkpoint id", checkpoint_id)?;
        require_token("task id", task_id)?;
        Ok(format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.prefix, thread_id, WRITE_KIND, namespace, checkpoint_id, task_id, index
        ))
    }

    /// Encode a [`DocumentKey`]
    pub fn encode(&self, key: &DocumentKey) -> Result<String> {
        match key {
            DocumentKey::Checkpoint {
                thread_id,
                namespace,
                checkpoint_id,
            } => self.checkpoint_key(thread_id, namespace, checkpoint_id),
            DocumentKey::Write {
                thread_id,
                namespace,
                checkpoint_id,
                task_id,
                index,
            } => self.write_key(thread_id, namespace, checkpoint_id, task_id, *index),
        }
    }

    /// Split a key produced by this codec back into its components
    pub fn decode(&self, key: &str) -> Result<DocumentKey> {
        let parts: Vec<&str> = key.split(KEY_DELIMITER).collect();
        let malformed = |reason: &str| CheckpointError::InvalidKey(format!("{key:?}: {reason}"));

        if parts.len() < 3 || parts[0] != self.prefix {
            return Err(malformed("missing key prefix"));
        }
        if parts[1].is_empty() {
            return Err(malformed("empty thread id"));
        }

        match (parts[2], parts.len()) {
            (CHECKPOINT_KIND, 5) => {
                if parts[4].is_empty() {
                    return Err(malformed("empty checkpoint id"));
                }
                Ok(DocumentKey::Checkpoint {
                    thread_id: parts[1].to_string(),
                    namespace: parts[3].to_string(),
                    checkpoint_id: parts[4].to_string(),
                })
            }
            (WRITE_KIND, 7) => {
                if parts[4].is_empty() || parts[5].is_empty() {
                    return Err(malformed("empty checkpoint or task id"));
                }
                let index = parts[6]
                    .parse::<usize>()
                    .map_err(|_| malformed("write index is not a number"))?;
                Ok(DocumentKey::Write {
                    thread_id: parts[1].to_string(),
                    namespace: parts[3].to_string(),
                    checkpoint_id: parts[4].to_string(),
                    task_id: parts[5].to_string(),
                    index,
                })
            }
            (CHECKPOINT_KIND, _) | (WRITE_KIND, _) => Err(malformed("wrong number of components")),
            _ => Err(malformed("unknown document kind")),
        }
    }

    /// Prefix covering every document of a thread, across namespaces
    pub fn thread_prefix(&self, thread_id: &str) -> Result<String> {
        require_token("thread id", thread_id)?;
        Ok(format!("{}:{}:", self.prefix, thread_id))
    }

    /// Prefix covering the checkpoint documents of one namespace
    pub fn checkpoint_prefix(&self, thread_id: &str, namespace: &str) -> Result<String> {
        require_token("thread id", thread_id)?;
        require_delimiter_free("namespace", namespace)?;
        Ok(format!(
            "{}:{}:{}:{}:",
            self.prefix, thread_id, CHECKPOINT_KIND, namespace
        ))
    }

    /// Prefix covering the pending writes of one checkpoint
    pub fn writes_prefix(
        &self,
        thread_id: &str,
        namespace: &str,
        checkpoint_id: &str,
    ) -> Result<String> {
        require_token("thread id", thread_id)?;
        require_delimiter_free("namespace", namespace)?;
        require_token("checkpoint id", checkpoint_id)?;
        Ok(format!(
            "{}:{}:{}:{}:{}:",
            self.prefix, thread_id, WRITE_KIND, namespace, checkpoint_id
        ))
    }
}

fn require_delimiter_free(what: &str, value: &str) -> Result<()> {
    if value.contains(KEY_DELIMITER) {
        return Err(CheckpointError::InvalidKey(format!(
            "{what} {value:?} contains the key delimiter '{KEY_DELIMITER}'"
        )));
    }
    Ok(())
}

fn require_token(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CheckpointError::InvalidKey(format!("{what} must not be empty")));
    }
    require_delimiter_free(what, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checkpoint_key_layout() {
        let codec = KeyCodec::new();
        let key = codec.checkpoint_key("t1", "", "cp-1").unwrap();
        assert_eq!(key, "checkpoint:t1:checkpoint::cp-1");

        let decoded = codec.decode(&key).unwrap();
        assert_eq!(
            decoded,
            DocumentKey::Checkpoint {
                thread_id: "t1".to_string(),
                namespace: String::new(),
                checkpoint_id: "cp-1".to_string(),
            }
        );
        assert_eq!(decoded.kind(), DocumentKind::Checkpoint);
    }

    #[test]
    fn test_write_key_layout() {
        let codec = KeyCodec::new();
        let key = codec.write_key("t1", "ns1", "cp-1", "task-a", 3).unwrap();
        assert_eq!(key, "checkpoint:t1:write:ns1:cp-1:task-a:3");

        let decoded = codec.decode(&key).unwrap();
        assert!(decoded.belongs_to("t1", "ns1", "cp-1"));
        assert!(!decoded.belongs_to("t1", "", "cp-1"));
        match decoded {
            DocumentKey::Write { task_id, index, .. } => {
                assert_eq!(task_id, "task-a");
                assert_eq!(index, 3);
            }
            other => panic!("expected write key, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_delimiter() {
        let codec = KeyCodec::new();
        assert!(matches!(
            codec.checkpoint_key("t:1", "", "cp-1"),
            Err(CheckpointError::InvalidKey(_))
        ));
        assert!(matches!(
            codec.checkpoint_key("t1", "a:b", "cp-1"),
            Err(CheckpointError::InvalidKey(_))
        ));
        assert!(matches!(
            codec.write_key("t1", "", "cp-1", "task:a", 0),
            Err(CheckpointError::InvalidKey(_))
        ));
        assert!(KeyCodec::with_prefix("my:prefix").is_err());
    }

    #[test]
    fn test_rejects_empty_identifiers() {
        let codec = KeyCodec::new();
        assert!(codec.checkpoint_key("", "", "cp-1").is_err());
        assert!(codec.checkpoint_key("t1", "", "").is_err());
        assert!(codec.write_key("t1", "", "cp-1", "", 0).is_err());
        assert!(KeyCodec::with_prefix("").is_err());
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        let codec = KeyCodec::new();
        for key in [
            "other:t1:checkpoint::cp-1",
            "checkpoint:t1:blob::cp-1",
            "checkpoint:t1:checkpoint:cp-1",
            "checkpoint:t1:write::cp-1:task-a:x",
            "checkpoint:t1:write::cp-1:task-a",
            "checkpoint::checkpoint::cp-1",
        ] {
            assert!(codec.decode(key).is_err(), "{key} should not decode");
        }
    }

    #[test]
    fn test_prefixes_cover_keys() {
        let codec = KeyCodec::with_prefix("ckpt").unwrap();
        let cp = codec.checkpoint_key("t1", "ns1", "cp-1").unwrap();
        let w = codec.write_key("t1", "ns1", "cp-1", "task-a", 0).unwrap();

        let thread = codec.thread_prefix("t1").unwrap();
        assert!(cp.starts_with(&thread));
        assert!(w.starts_with(&thread));
        assert!(cp.starts_with(&codec.checkpoint_prefix("t1", "ns1").unwrap()));
        assert!(!cp.starts_with(&codec.checkpoint_prefix("t1", "").unwrap()));
        assert!(w.starts_with(&codec.writes_prefix("t1", "ns1", "cp-1").unwrap()));

        // a thread whose id extends another must not fall under its prefix
        let other = codec.checkpoint_key("t10", "", "cp-1").unwrap();
        assert!(!other.starts_with(&thread));
    }

    fn token() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.\\-]{1,16}"
    }

    proptest! {
        #[test]
        fn prop_write_key_decomposes(
            thread in token(),
            ns in "[a-z0-9|]{0,8}",
            cp in token(),
            task in token(),
            idx in 0usize..10_000,
        ) {
            let codec = KeyCodec::new();
            let original = DocumentKey::Write {
                thread_id: thread,
                namespace: ns,
                checkpoint_id: cp,
                task_id: task,
                index: idx,
            };
            let key = codec.encode(&original).unwrap();
            prop_assert_eq!(codec.decode(&key).unwrap(), original);
        }

        #[test]
        fn prop_checkpoint_key_decomposes(thread in token(), ns in "[a-z0-9|]{0,8}", cp in token()) {
            let codec = KeyCodec::new();
            let original = DocumentKey::Checkpoint {
                thread_id: thread,
                namespace: ns,
                checkpoint_id: cp,
            };
            let key = codec.encode(&original).unwrap();
            prop_assert_eq!(codec.decode(&key).unwrap(), original);
        }
    }
}
