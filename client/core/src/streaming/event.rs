//! Typed stream events
//!
//! Both call sites of the backend emit the same envelope, but the `content`
//! of a chunk comes in three shapes:
//!
//! ```text
//! {"type":"chunk","content":{"text":"..."}}       chat
//! {"type":"chunk","content":"..."}                template
//! {"type":"chunk","content":{"metadata":{...}}}   template (sources)
//! ```
//!
//! All of them are accepted and normalized here.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Message used when the server reports an error without saying what
pub const DEFAULT_STREAM_ERROR: &str = "An error occurred during streaming";

/// A decoded server event
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The server accepted the request
    Start {
        /// Request ID echoed by the server
        id: Option<String>,
    },
    /// A piece of the answer
    Chunk {
        /// Text to append
        text: String,
    },
    /// Side-channel data kept with the exchange
    Metadata {
        /// Metadata object
        payload: Map<String, Value>,
    },
    /// The server gave up
    Error {
        /// What went wrong
        message: String,
    },
    /// The answer is complete
    End,
}

/// Why a `data: ` payload could not be turned into an event
#[derive(Debug, Error)]
pub enum EventParseError {
    /// Payload is not a JSON event object
    #[error("Malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// `type` is not one this client understands
    #[error("Unknown event type '{0}'")]
    UnknownType(String),

    /// A metadata event without an object to carry
    #[error("Metadata event without a metadata object")]
    MissingMetadata,
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl StreamEvent {
    /// Parse the payload of a `data: ` block
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not JSON, has an unknown `type`, or
    /// is a metadata event without a metadata object.
    pub fn parse(payload: &str) -> Result<Self, EventParseError> {
        let wire: WireEvent = serde_json::from_str(payload)?;

        match wire.kind.as_str() {
            "start" => Ok(Self::Start {
                id: wire.id.map(|id| match id {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            }),
            "chunk" => Ok(Self::from_chunk_content(wire.content)),
            "metadata" => match wire.content {
                Some(Value::Object(mut content)) => match content.remove("metadata") {
                    Some(Value::Object(payload)) => Ok(Self::Metadata { payload }),
                    Some(_) => Err(EventParseError::MissingMetadata),
                    None => Ok(Self::Metadata { payload: content }),
                },
                _ => Err(EventParseError::MissingMetadata),
            },
            "error" => Ok(Self::Error {
                message: error_message(wire.error),
            }),
            "end" => Ok(Self::End),
            other => Err(EventParseError::UnknownType(other.to_string())),
        }
    }

    fn from_chunk_content(content: Option<Value>) -> Self {
        match content {
            Some(Value::String(text)) => Self::Chunk { text },
            Some(Value::Object(mut content)) => {
                if let Some(Value::Object(payload)) = content.remove("metadata") {
                    return Self::Metadata { payload };
                }
                match content.remove("text") {
                    Some(Value::String(text)) => Self::Chunk { text },
                    _ => Self::Chunk {
                        text: String::new(),
                    },
                }
            }
            _ => Self::Chunk {
                text: String::new(),
            },
        }
    }

    /// Whether this event ends the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End)
    }

    /// Event name as it appears on the wire
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Chunk { .. } => "chunk",
            Self::Metadata { .. } => "metadata",
            Self::Error { .. } => "error",
            Self::End => "end",
        }
    }
}

fn error_message(error: Option<Value>) -> String {
    match error {
        Some(Value::String(message)) if !message.trim().is_empty() => message,
        Some(Value::Null) | None => DEFAULT_STREAM_ERROR.to_string(),
        Some(Value::String(_)) => DEFAULT_STREAM_ERROR.to_string(),
        Some(other) => other.to_string(),
    }
}
