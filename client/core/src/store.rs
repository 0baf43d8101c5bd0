//! Message Store
//!
//! Ordered log of completed exchanges for one conversation surface.
//!
//! The store is append-only: exchanges are never merged or edited once
//! committed, and the only way to remove them is [`MessageStore::clear`].

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::{Attachment, ConversationMessage, ExchangeId, MessageId, MessageRole};

/// One question and its finished answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Unique exchange ID
    pub id: ExchangeId,
    /// The question as submitted
    pub question: String,
    /// The accumulated answer
    pub answer: String,
    /// Attachment submitted with the question
    pub attachment: Option<Attachment>,
    /// Metadata stashed while streaming (e.g. retrieval sources)
    pub metadata: Option<Map<String, Value>>,
    /// When the exchange was committed; milliseconds since the epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finalized_at: DateTime<Utc>,
}

impl Exchange {
    /// Create an exchange finalized now
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        attachment: Option<Attachment>,
        metadata: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            id: ExchangeId::new(),
            question: question.into(),
            answer: answer.into(),
            attachment,
            metadata,
            finalized_at: Utc::now(),
        }
    }

    /// The user and assistant messages this exchange renders as
    #[must_use]
    pub fn messages(&self) -> [ConversationMessage; 2] {
        [
            ConversationMessage {
                id: MessageId::for_exchange(&self.id, MessageRole::User),
                role: MessageRole::User,
                content: self.question.clone(),
                attachment: self.attachment.clone(),
            },
            ConversationMessage {
                id: MessageId::for_exchange(&self.id, MessageRole::Assistant),
                role: MessageRole::Assistant,
                content: self.answer.clone(),
                attachment: None,
            },
        ]
    }
}

/// Append-only sequence of exchanges
#[derive(Debug, Default)]
pub struct MessageStore {
    exchanges: RwLock<Vec<Exchange>>,
}

impl MessageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with earlier exchanges
    #[must_use]
    pub fn with_history(exchanges: Vec<Exchange>) -> Self {
        Self {
            exchanges: RwLock::new(exchanges),
        }
    }

    /// Append a committed exchange
    pub fn append(&self, exchange: Exchange) {
        let mut exchanges = self.exchanges.write();
        exchanges.push(exchange);
        tracing::debug!(count = exchanges.len(), "Exchange appended to store");
    }

    /// All exchanges in commit order
    #[must_use]
    pub fn all(&self) -> Vec<Exchange> {
        self.exchanges.read().clone()
    }

    /// The most recently committed exchange
    #[must_use]
    pub fn last(&self) -> Option<Exchange> {
        self.exchanges.read().last().cloned()
    }

    /// Number of committed exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.read().len()
    }

    /// Whether nothing has been committed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.read().is_empty()
    }

    /// Remove every exchange
    pub fn clear(&self) {
        let mut exchanges = self.exchanges.write();
        let removed = exchanges.len();
        exchanges.clear();
        tracing::debug!(removed, "Message store cleared");
    }

    /// Flatten the log into alternating user/assistant messages
    #[must_use]
    pub fn conversation(&self) -> Vec<ConversationMessage> {
        self.exchanges
            .read()
            .iter()
            .flat_map(Exchange::messages)
            .collect()
    }
}
