use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::errors::AccessError;
use crate::ids::SessionName;

/// Wire form of the liveness probe, and the post type clients acknowledge it with.
pub const PROBE_MARKER: &str = "checkstatus";

/// Post type a client sends after (re)starting.
pub const CONNECT_TYPE: &str = "connect";

/// An entry in a session's mailbox.
///
/// Serializes as the bare payload for application messages and as the string
/// `"checkstatus"` for the probe, so a poll response looks like `[{"msg":1},"checkstatus"]`.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Probe,
    Application(serde_json::Value),
}

impl Message {
    pub fn is_probe(&self) -> bool {
        matches!(self, Self::Probe)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Self::Application(value)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Probe => serializer.serialize_str(PROBE_MARKER),
            Self::Application(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value.as_str() {
            Some(PROBE_MARKER) => Ok(Self::Probe),
            _ => Ok(Self::Application(value)),
        }
    }
}

/// Body of a POST from a client: `{ "type": ..., "data": ... }`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PostBody {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// What a post asks the engine to do.
#[derive(Clone, Debug, PartialEq)]
pub enum PostKind {
    /// Liveness acknowledgment.
    CheckStatus,
    /// Client signals a fresh start.
    Connect,
    /// Anything else goes to the application's message handler untouched.
    Application { kind: String, data: serde_json::Value },
}

impl PostBody {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: Some(kind.into()),
            data,
        }
    }

    pub fn classify(self) -> Result<PostKind, AccessError> {
        let kind = match self.kind {
            Some(kind) if !kind.is_empty() => kind,
            _ => return Err(AccessError::MissingType),
        };
        Ok(match kind.as_str() {
            PROBE_MARKER => PostKind::CheckStatus,
            CONNECT_TYPE => PostKind::Connect,
            _ => PostKind::Application {
                kind,
                data: self.data,
            },
        })
    }
}

/// An application message posted by a client, as handed to the event sink.
#[derive(Clone, Debug, Serialize)]
pub struct InboundMessage {
    pub session: SessionName,
    pub kind: String,
    pub data: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(session: SessionName, kind: String, data: serde_json::Value) -> Self {
        Self {
            session,
            kind,
            data,
            received_at: Utc::now(),
        }
    }
}
