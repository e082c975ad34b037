//! Tagged serialization envelope for opaque payloads
//!
//! The store never interprets checkpoint bodies, metadata or write values. It
//! persists them as an [`Envelope`]: the encoded bytes plus a tag naming the
//! encoder that produced them.
//!
//! - `json` - UTF-8 JSON via `serde_json`, used whenever the value reads back
//!   unchanged from JSON
//! - `binary` - `bincode`, used for values JSON cannot express (maps keyed by
//!   tuples, non-finite floats, nested `Option`s)
//!
//! [`Envelope::dump`] picks the encoder and checks the result decodes to an
//! equal value, so `load(dump(x)) == x` holds for everything it accepts. In a stored
//! document the envelope is written as `{"bytes": <base64>, "type": <tag>}`.

use crate::error::{CheckpointError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Type tag persisted next to every encoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Json,
    Binary,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Json => "json",
            PayloadKind::Binary => "binary",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadKind {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(PayloadKind::Json),
            "binary" => Ok(PayloadKind::Binary),
            other => Err(CheckpointError::Decode(format!(
                "unknown payload type tag {other:?}"
            ))),
        }
    }
}

/// Encoded payload together with the encoder that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Json(Vec<u8>),
    Binary(Vec<u8>),
}

impl Envelope {
    /// Encode a value, preferring JSON and falling back to binary
    ///
    /// JSON is kept only when it decodes back to an equal value. Some values
    /// encode to JSON without error yet come back different: non-finite
    /// floats become `null`, and `Some(None)` collapses to `None`. Those, and
    /// values JSON rejects outright, go through the binary encoder. A value
    /// that neither encoder reproduces (for example a NaN) is refused with
    /// [`CheckpointError::Invalid`] instead of being stored lossily.
    pub fn dump<T>(value: &T) -> Result<Self>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        match serde_json::to_vec(value) {
            Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
                Ok(restored) if restored == *value => return Ok(Envelope::Json(bytes)),
                _ => tracing::trace!("payload changes under JSON encoding, using binary encoding"),
            },
            Err(json_err) => {
                tracing::trace!(error = %json_err, "payload has no JSON form, using binary encoding")
            }
        }

        let bytes = bincode::serialize(value)?;
        match bincode::deserialize::<T>(&bytes) {
            Ok(restored) if restored == *value => Ok(Envelope::Binary(bytes)),
            _ => Err(CheckpointError::Invalid(
                "value does not survive JSON or binary encoding unchanged".to_string(),
            )),
        }
    }

    /// Encode a value with the binary encoder regardless of its JSON form
    pub fn dump_binary<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Envelope::Binary(bincode::serialize(value)?))
    }

    /// Decode the payload into `T`
    ///
    /// Corrupt bytes, or bytes that do not describe a `T`, fail with
    /// [`CheckpointError::Decode`].
    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Envelope::Json(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| CheckpointError::Decode(format!("corrupt json payload: {e}"))),
            Envelope::Binary(bytes) => bincode::deserialize(bytes)
                .map_err(|e| CheckpointError::Decode(format!("corrupt binary payload: {e}"))),
        }
    }

    /// Rebuild an envelope from its stored parts
    pub fn from_parts(kind: PayloadKind, bytes: Vec<u8>) -> Self {
        match kind {
            PayloadKind::Json => Envelope::Json(bytes),
            PayloadKind::Binary => Envelope::Binary(bytes),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Envelope::Json(_) => PayloadKind::Json,
            Envelope::Binary(_) => PayloadKind::Binary,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Envelope::Json(bytes) | Envelope::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Envelope::Json(bytes) | Envelope::Binary(bytes) => bytes,
        }
    }
}

/// Stored form of an envelope
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    bytes: String,
    #[serde(rename = "type")]
    kind: String,
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawEnvelope {
            bytes: BASE64.encode(self.bytes()),
            kind: self.kind().as_str().to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEnvelope::deserialize(deserializer)?;
        let kind = raw
            .kind
            .parse::<PayloadKind>()
            .map_err(serde::de::Error::custom)?;
        let bytes = BASE64
            .decode(raw.bytes.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64 payload: {e}")))?;
        Ok(Envelope::from_parts(kind, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_json_envelope() {
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        let envelope = Envelope::dump(&data).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::Json);
        assert_eq!(envelope.bytes(), br#"{"name":"test","value":42}"#);

        let restored: TestData = envelope.load().unwrap();
        assert_eq!(data, restored);
    }

    #[test]
    fn test_falls_back_to_binary() {
        // JSON object keys must be strings
        let mut grid: HashMap<(u32, u32), String> = HashMap::new();
        grid.insert((0, 1), "a".to_string());
        grid.insert((2, 3), "b".to_string());

        let envelope = Envelope::dump(&grid).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::Binary);

        let restored: HashMap<(u32, u32), String> = envelope.load().unwrap();
        assert_eq!(grid, restored);
    }

    #[test]
    fn test_nested_option_uses_binary() {
        let value: Option<Option<i32>> = Some(None);
        let envelope = Envelope::dump(&value).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::Binary);
        assert_eq!(envelope.load::<Option<Option<i32>>>().unwrap(), Some(None));

        let plain: Option<Option<i32>> = Some(Some(3));
        assert_eq!(Envelope::dump(&plain).unwrap().kind(), PayloadKind::Json);
    }

    #[test]
    fn test_non_finite_float_uses_binary() {
        for value in [f64::INFINITY, f64::NEG_INFINITY] {
            let envelope = Envelope::dump(&value).unwrap();
            assert_eq!(envelope.kind(), PayloadKind::Binary);
            assert_eq!(envelope.load::<f64>().unwrap(), value);
        }

        assert_eq!(Envelope::dump(&1.5f64).unwrap().kind(), PayloadKind::Json);
    }

    #[test]
    fn test_nan_is_refused() {
        let err = Envelope::dump(&f64::NAN).unwrap_err();
        assert!(matches!(err, CheckpointError::Invalid(_)));
    }

    #[test]
    fn test_forced_binary() {
        let data = TestData {
            name: "bin".to_string(),
            value: -7,
        };
        let envelope = Envelope::dump_binary(&data).unwrap();
        assert_eq!(envelope.kind(), PayloadKind::Binary);
        assert_eq!(envelope.load::<TestData>().unwrap(), data);
    }

    #[test]
    fn test_corrupt_bytes_fail_to_decode() {
        let envelope = Envelope::Json(b"{not json".to_vec());
        assert!(matches!(
            envelope.load::<serde_json::Value>(),
            Err(CheckpointError::Decode(_))
        ));

        let envelope = Envelope::Binary(vec![0xff]);
        assert!(matches!(
            envelope.load::<TestData>(),
            Err(CheckpointError::Decode(_))
        ));
    }

    #[test]
    fn test_stored_form() {
        let envelope = Envelope::dump(&json!({"k": "v"})).unwrap();
        let stored = serde_json::to_value(&envelope).unwrap();
        assert_eq!(stored["type"], json!("json"));
        assert_eq!(stored["bytes"], json!(BASE64.encode(br#"{"k":"v"}"#)));

        let back: Envelope = serde_json::from_value(stored).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let stored = json!({"bytes": "", "type": "pickle"});
        let err = serde_json::from_value::<Envelope>(stored).unwrap_err();
        assert!(err.to_string().contains("pickle"));
        assert!("pickle".parse::<PayloadKind>().unwrap_err().is_decode());
    }

    fn json_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[^\\x00]{0,12}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_json_round_trip(value in json_value()) {
            let envelope = Envelope::dump(&value).unwrap();
            prop_assert_eq!(envelope.kind(), PayloadKind::Json);
            let stored = serde_json::to_value(&envelope).unwrap();
            let back: Envelope = serde_json::from_value(stored).unwrap();
            prop_assert_eq!(back.load::<serde_json::Value>().unwrap(), value);
        }

        #[test]
        fn prop_binary_round_trip(entries in prop::collection::hash_map((any::<u16>(), any::<u16>()), any::<i64>(), 1..8)) {
            let envelope = Envelope::dump(&entries).unwrap();
            prop_assert_eq!(envelope.kind(), PayloadKind::Binary);
            prop_assert_eq!(envelope.load::<HashMap<(u16, u16), i64>>().unwrap(), entries);
        }
    }
}
