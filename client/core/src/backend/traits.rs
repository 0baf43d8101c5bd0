//! Transport Traits
//!
//! The consumer never talks HTTP directly. It hands a [`StreamRequest`] to a
//! [`Transport`] and reads back an ordered stream of byte chunks, which keeps
//! the decoding and state machine testable without a server.
//!
//! # Design Philosophy
//!
//! A transport is responsible for:
//! - Performing the request described by a `StreamRequest`
//! - Rejecting non-success responses before any body bytes are yielded
//! - Yielding body chunks in arrival order, with no framing applied
//!
//! Framing, parsing and state live in [`crate::streaming`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

/// Ordered stream of response body chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Errors raised while opening or reading a response body
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the body could not be read
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if one could be read
        body: String,
    },

    /// The connection broke mid-stream (used by non-HTTP transports)
    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

/// Description of a streaming request
///
/// Opaque to the consumer; only the transport interprets it.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    /// HTTP method
    pub method: reqwest::Method,
    /// Path relative to the API base URL, starting with `/`
    pub path: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// JSON request body
    pub body: Value,
}

impl StreamRequest {
    /// POST `body` as JSON to `path`
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: reqwest::Method::POST,
            path: path.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Add a request header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Something that can open a streaming response
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name (for logging)
    fn name(&self) -> &'static str;

    /// Perform `request` and return its body as a byte stream
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or the server responds
    /// with a non-success status.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}
