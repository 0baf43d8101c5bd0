//! Insights Core - Headless Streaming Client for AI Insights
//!
//! This crate holds the client-side logic of AI Insights workspace chat and
//! template runs, independent of any UI. A terminal, a web view or a test
//! harness can drive it the same way.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │        ┌─────────┐      ┌───────────┐      ┌──────────┐         │
//! │        │   CLI   │      │  Web view │      │ Headless │         │
//! │        └────┬────┘      └─────┬─────┘      └────┬─────┘         │
//! │             └─────────────────┼─────────────────┘               │
//! │                  start / cancel (down)                          │
//! │                  SessionUpdate (up)                             │
//! └───────────────────────────────┼─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼─────────────────────────────────┐
//! │                        INSIGHTS CORE                             │
//! │  ┌────────────────────────────┴──────────────────────────────┐  │
//! │  │                     StreamConsumer                         │  │
//! │  │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐ │  │
//! │  │  │ Decoder  │  │ Session  │  │ Message  │  │ Transport  │ │  │
//! │  │  │  (SSE)   │  │  State   │  │  Store   │  │  (HTTP)    │ │  │
//! │  │  └──────────┘  └──────────┘  └──────────┘  └────────────┘ │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamConsumer`]: Drives one question at a time from request to committed answer
//! - [`SessionUpdate`]: Changes pushed to observing surfaces
//! - [`MessageStore`]: Append-only log of finished exchanges
//! - [`QueryCache`]: Shared keyed cache invalidated on commit
//! - [`ApiClient`]: HTTP transport for the AI Insights REST API
//!
//! # Module Overview
//!
//! - [`backend`]: Transport trait and the reqwest-backed API client
//! - [`cache`]: Keyed query cache
//! - [`config`]: TOML/env configuration loading
//! - [`messages`]: Identifiers, roles and session updates
//! - [`session`]: Single-question state machine
//! - [`store`]: Exchange log
//! - [`streaming`]: Decoder, events and the consumer
//!
//! # No Terminal Dependencies
//!
//! Nothing in this crate reads stdin or writes to stdout.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod messages;
pub mod session;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    ApiClient, ApiError, ByteStream, ChatResponse, Source, StreamRequest, TemplateResult,
    Transport, TransportError,
};
pub use cache::{QueryCache, QueryKey};
pub use messages::{
    Attachment, ConversationMessage, ExchangeId, MessageId, MessageRole, RequestId, SessionId,
    SessionUpdate,
};
pub use session::{
    SessionFailure, SessionSnapshot, SessionStatus, StreamSession, DEFAULT_CANCEL_MARKER,
    GENERIC_FAILURE_INDICATOR,
};
pub use store::{Exchange, MessageStore};

// Streaming exports
pub use streaming::{
    ConsumerConfig, EventParseError, SessionHandle, SessionOutcome, SseDecoder, StartError,
    StreamConsumer, StreamEvent,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
