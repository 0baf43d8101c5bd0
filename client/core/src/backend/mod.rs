//! Backend Integration
//!
//! Access to the AI Insights REST/SSE API through the [`Transport`] trait.
//!
//! # Usage
//!
//! ```ignore
//! use insights_core::backend::{ApiClient, Transport};
//!
//! let client = ApiClient::new(&config);
//! let request = client.chat_request("workspace-1", "Summarize Q3", None, None);
//! let body = client.open(&request).await?;
//! ```

mod client;
mod traits;
mod wire;

pub use client::{ApiClient, ApiError};
pub use traits::{ByteStream, StreamRequest, Transport, TransportError};
pub use wire::{ChatRequest, ChatResponse, Source, TemplateProcessRequest, TemplateResult};
