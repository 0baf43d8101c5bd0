//! Client Messages
//!
//! Identifiers, conversation roles and the updates a [`StreamConsumer`] pushes
//! to whatever surface is rendering it (terminal, web view, test harness).
//!
//! # Design Philosophy
//!
//! The consumer owns every piece of state for an in-flight answer. Surfaces
//! never mutate that state; they render the [`SessionUpdate`]s they receive,
//! in order, and submit new questions through the consumer's entry points.
//!
//! [`StreamConsumer`]: crate::streaming::StreamConsumer

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::Exchange;

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Derive a message ID from its owning exchange and role
    #[must_use]
    pub fn for_exchange(exchange: &ExchangeId, role: MessageRole) -> Self {
        Self(format!("{}-{}", exchange.0, role.as_str()))
    }
}

/// Exchange identifier (one question and its answer)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    /// Generate a new unique exchange ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("exchange_{}_{id}", now_ms()))
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    ///
    /// Uses an atomic counter combined with timestamp to ensure uniqueness
    /// even when multiple sessions are created in the same millisecond.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("session_{}_{count}", now_ms()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request identifier sent in the `id` field of a chat request
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// `request-<epoch ms>`, the format the backend echoes back in its events
    pub fn new() -> Self {
        Self(format!("request-{}", now_ms()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who authored a conversation message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person asking
    User,
    /// The AI answer
    Assistant,
}

impl MessageRole {
    /// Wire/display name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// An attachment sent along with a question
///
/// Opaque to the consumer. In practice this is a `data:<mime>;base64,...`
/// URL, which is what the backend accepts in the `image` request field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attachment(String);

impl Attachment {
    /// Wrap an already-encoded reference (data URL, remote URL, ...)
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Encode raw bytes as a base64 data URL
    #[must_use]
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{mime};base64,{encoded}"))
    }

    /// The reference as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type, when the reference is a data URL
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let end = rest.find([';', ','])?;
        Some(&rest[..end]).filter(|m| !m.is_empty())
    }
}

/// A rendered conversation message (one half of an exchange)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Attachment shown with the message (user messages only)
    pub attachment: Option<Attachment>,
}

/// Updates pushed from the consumer to observing surfaces
///
/// Every mutation of the session produces exactly one update, delivered in the
/// order the mutations happened.
#[derive(Clone, Debug)]
pub enum SessionUpdate {
    /// A question was accepted; the surface should show a processing state
    Started {
        /// Session that became active
        session_id: SessionId,
        /// The submitted question
        question: String,
        /// Attachment submitted with the question
        attachment: Option<Attachment>,
    },

    /// Answer text arrived
    Chunk {
        /// Session the text belongs to
        session_id: SessionId,
        /// Newly appended text
        text: String,
    },

    /// Side-channel metadata arrived (e.g. retrieval sources)
    Metadata {
        /// Session the metadata belongs to
        session_id: SessionId,
        /// Metadata payload
        payload: Map<String, Value>,
    },

    /// The answer finished and was committed to the message store
    Completed {
        /// Session that completed
        session_id: SessionId,
        /// The committed exchange
        exchange: Exchange,
    },

    /// The session failed
    Errored {
        /// Session that failed
        session_id: SessionId,
        /// Failure description
        message: String,
        /// Text the surface should show in place of the answer
        visible_answer: String,
    },

    /// The user cancelled the session
    Cancelled {
        /// Session that was cancelled
        session_id: SessionId,
        /// Partial answer including the cancellation marker
        partial: String,
    },

    /// A terminal session was cleared back to idle
    Reset,
}

impl SessionUpdate {
    /// Session the update refers to (`None` for [`SessionUpdate::Reset`])
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Started { session_id, .. }
            | Self::Chunk { session_id, .. }
            | Self::Metadata { session_id, .. }
            | Self::Completed { session_id, .. }
            | Self::Errored { session_id, .. }
            | Self::Cancelled { session_id, .. } => Some(session_id),
            Self::Reset => None,
        }
    }

    /// Whether this update ends the session it refers to
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Errored { .. } | Self::Cancelled { .. }
        )
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
