//! Streaming Answer Consumption
//!
//! Everything between the transport's byte stream and the message store.
//!
//! # Architecture
//!
//! ```text
//!  Transport ──bytes──▶ SseDecoder ──blocks──▶ StreamEvent::parse
//!                                                   │
//!                                                   ▼
//!  MessageStore ◀──Exchange── StreamSession ◀── apply_event
//!       │                         │
//!       ▼                         ▼
//!  QueryCache::invalidate    SessionUpdate ──▶ subscribers
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use insights_core::backend::ApiClient;
//! use insights_core::streaming::StreamConsumer;
//! use insights_core::MessageStore;
//!
//! let client = Arc::new(ApiClient::new(&config));
//! let consumer = StreamConsumer::new(client.clone(), Arc::new(MessageStore::new()));
//! let mut updates = consumer.subscribe();
//!
//! let request = client.chat_request("workspace-1", "What changed in Q3?", None, None);
//! let handle = consumer.start("What changed in Q3?", None, request)?;
//!
//! while let Some(update) = updates.recv().await {
//!     // render update
//! }
//! ```

mod consumer;
mod decoder;
mod event;

pub use consumer::{ConsumerConfig, SessionHandle, SessionOutcome, StartError, StreamConsumer};
pub use decoder::{data_payload, SseDecoder, DATA_PREFIX, EVENT_DELIMITER};
pub use event::{EventParseError, StreamEvent, DEFAULT_STREAM_ERROR};
