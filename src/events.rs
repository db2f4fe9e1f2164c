//! Raw agent runtime events and their classification.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::trace::TraceNode;

/// One event as delivered by the agent runtime.
///
/// Exactly the records the runtime is known to send are modelled; anything
/// else deserializes with both fields empty and is dropped as unrecognized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<serde_json::Value>,
}

/// Body of an answer chunk record. `bytes` travels as base64 in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPart {
    #[serde(
        default,
        serialize_with = "serialize_bytes",
        deserialize_with = "deserialize_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub bytes: Option<Vec<u8>>,
}

impl RawEvent {
    /// A chunk record carrying answer bytes.
    pub fn chunk(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            chunk: Some(ChunkPart {
                bytes: Some(bytes.into()),
            }),
            trace: None,
        }
    }

    /// A trace record.
    pub fn trace(payload: serde_json::Value) -> Self {
        Self {
            chunk: None,
            trace: Some(payload),
        }
    }
}

/// What a raw event turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    TextFragment(String),
    TracePayload(TraceNode),
    Unrecognized,
}

/// Classify one raw event.
///
/// A chunk with a byte body wins over a trace on the same record. Bytes are
/// decoded as UTF-8 with invalid sequences replaced, so this never fails.
pub fn classify(event: RawEvent) -> Classified {
    if let Some(bytes) = event.chunk.and_then(|c| c.bytes) {
        return Classified::TextFragment(String::from_utf8_lossy(&bytes).into_owned());
    }
    match event.trace {
        Some(payload) => Classified::TracePayload(TraceNode::from(payload)),
        None => Classified::Unrecognized,
    }
}

fn serialize_bytes<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u8>>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
        .transpose()
}
