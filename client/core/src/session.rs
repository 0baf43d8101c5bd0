//! Stream Session State
//!
//! The mutable state of one in-flight question: what was asked, the answer
//! accumulated so far, and where the session is in its lifecycle.
//!
//! ```text
//! Idle ──begin──▶ Active ──┬── end ──────▶ Completed ──▶ Idle (exchange committed)
//!                          ├── error ────▶ Errored ───reset──▶ Idle
//!                          └── cancel ───▶ Cancelled ─reset──▶ Idle
//! ```
//!
//! This type is a plain state machine with no I/O; the
//! [`StreamConsumer`](crate::streaming::StreamConsumer) wraps it with the
//! decoder, the transport and observer notification.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::{Attachment, SessionId};
use crate::store::Exchange;

/// Shown in place of the answer when the transport fails
pub const GENERIC_FAILURE_INDICATOR: &str = "An error occurred while processing your request.";

/// Appended to the partial answer when the user cancels
pub const DEFAULT_CANCEL_MARKER: &str = " [cancelled]";

/// Lifecycle status of a stream session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No question in flight
    #[default]
    Idle,
    /// Waiting for or receiving the answer
    Active,
    /// Cancelled by the user
    Cancelled,
    /// Failed (transport or server error)
    Errored,
    /// Finished; the exchange is being committed
    Completed,
}

impl SessionStatus {
    /// Whether this is one of the end states
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Errored | Self::Completed)
    }
}

/// Why a session failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionFailure {
    /// The server sent an explicit error event
    Server(String),
    /// The request failed or the connection broke
    Transport(String),
}

impl SessionFailure {
    /// The underlying failure description
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Server(message) | Self::Transport(message) => message,
        }
    }

    /// Text shown to the user in place of the answer
    #[must_use]
    pub fn indicator(&self) -> String {
        match self {
            Self::Server(message) => format!("Error: {message}"),
            Self::Transport(_) => GENERIC_FAILURE_INDICATOR.to_string(),
        }
    }
}

/// Point-in-time copy of a session, for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    /// Session ID (`None` while idle)
    pub session_id: Option<SessionId>,
    /// Current status
    pub status: SessionStatus,
    /// Question being answered
    pub question: String,
    /// Attachment sent with the question
    pub attachment: Option<Attachment>,
    /// Answer text received so far
    pub accumulated_text: String,
    /// Failure description while errored
    pub error: Option<String>,
    /// What the surface should display as the answer
    pub visible_answer: String,
}

impl SessionSnapshot {
    /// Whether submission should be disabled
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// State of a single question/answer stream
#[derive(Debug, Default)]
pub struct StreamSession {
    id: Option<SessionId>,
    status: SessionStatus,
    question: String,
    attachment: Option<Attachment>,
    accumulated_text: String,
    metadata: Option<Map<String, Value>>,
    failure: Option<SessionFailure>,
    chunk_count: u32,
    started_at: Option<Instant>,
}

impl StreamSession {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session ID (`None` while idle)
    #[must_use]
    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether a question is in flight
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether `id` is the session currently in flight
    #[must_use]
    pub fn is_active_session(&self, id: &SessionId) -> bool {
        self.is_active() && self.id.as_ref() == Some(id)
    }

    /// The question being answered
    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Answer text received so far
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Failure, while errored
    #[must_use]
    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    /// Metadata stashed so far
    #[must_use]
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    /// Number of chunks applied
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Time since the session became active
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Start a new question, discarding any previous state
    ///
    /// Callers must check [`is_active`](Self::is_active) first; this method
    /// does not refuse.
    pub fn begin(&mut self, question: String, attachment: Option<Attachment>) -> SessionId {
        let id = SessionId::new();
        *self = Self {
            id: Some(id.clone()),
            status: SessionStatus::Active,
            question,
            attachment,
            started_at: Some(Instant::now()),
            ..Self::default()
        };
        id
    }

    /// Append answer text; ignored unless active
    pub fn append(&mut self, text: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        self.accumulated_text.push_str(text);
        self.chunk_count += 1;
        true
    }

    /// Stash metadata for the committed exchange; later payloads replace earlier ones
    pub fn stash_metadata(&mut self, payload: Map<String, Value>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.metadata = Some(payload);
        true
    }

    /// Mark the session as failed
    pub fn fail(&mut self, failure: SessionFailure) -> bool {
        if !self.is_active() {
            return false;
        }
        self.failure = Some(failure);
        self.status = SessionStatus::Errored;
        true
    }

    /// Mark the session as cancelled, appending `marker` to the partial answer
    pub fn cancel(&mut self, marker: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        self.accumulated_text.push_str(marker);
        self.status = SessionStatus::Cancelled;
        true
    }

    /// Complete the session and build its exchange, leaving the session idle
    ///
    /// Returns `None` unless active.
    pub fn complete(&mut self) -> Option<Exchange> {
        if !self.is_active() {
            return None;
        }
        self.status = SessionStatus::Completed;
        let finished = std::mem::take(self);
        Some(Exchange::new(
            finished.question,
            finished.accumulated_text,
            finished.attachment,
            finished.metadata,
        ))
    }

    /// Return a terminal session to idle
    pub fn reset(&mut self) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        *self = Self::default();
        true
    }

    /// What the surface should display as the answer
    #[must_use]
    pub fn visible_answer(&self) -> String {
        match (self.status, self.failure()) {
            (SessionStatus::Errored, Some(failure)) => failure.indicator(),
            _ => self.accumulated_text.clone(),
        }
    }

    /// Copy the session for rendering
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            question: self.question.clone(),
            attachment: self.attachment.clone(),
            accumulated_text: self.accumulated_text.clone(),
            error: self.failure().map(|f| f.message().to_string()),
            visible_answer: self.visible_answer(),
        }
    }
}
