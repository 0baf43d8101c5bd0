//! AI Insights API Client
//!
//! reqwest-backed [`Transport`] plus request builders for the two streaming
//! call sites and their non-streaming counterparts.
//!
//! # Endpoints
//!
//! - `POST /api/chat/{workspace_id}` - workspace chat (streamed or not)
//! - `POST /api/templates/process` - run a prompt template (streamed or not)
//! - `GET /` - reachability check

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::traits::{ByteStream, StreamRequest, Transport, TransportError};
use super::wire::{ChatRequest, ChatResponse, TemplateProcessRequest, TemplateResult};
use crate::config::ClientConfig;
use crate::messages::{Attachment, RequestId};

/// Errors from the non-streaming calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or the body could not be read
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The body was not the expected JSON
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// AI Insights API client
#[derive(Clone, Debug)]
pub struct ApiClient {
    /// Base URL, without trailing slash
    base_url: String,
    /// Model used when a call does not name one
    default_model: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create a client from resolved configuration
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            http_client,
        }
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model used when a call does not name one
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn chat_path(workspace_id: &str) -> String {
        format!("/api/chat/{workspace_id}")
    }

    fn chat_body(
        &self,
        prompt: &str,
        model: Option<&str>,
        image: Option<&Attachment>,
        stream: bool,
    ) -> ChatRequest {
        ChatRequest {
            id: RequestId::new(),
            prompt: prompt.to_string(),
            model: model.unwrap_or(&self.default_model).to_string(),
            stream,
            image: image.cloned(),
        }
    }

    /// Streaming chat request for a workspace
    #[must_use]
    pub fn chat_request(
        &self,
        workspace_id: &str,
        prompt: &str,
        model: Option<&str>,
        image: Option<&Attachment>,
    ) -> StreamRequest {
        let body = self.chat_body(prompt, model, image, true);
        StreamRequest::post(Self::chat_path(workspace_id), to_json(&body))
    }

    /// Streaming template run
    #[must_use]
    pub fn template_request(
        &self,
        workspace_id: &str,
        template_id: &str,
        user_input: &str,
        additional_context: Map<String, Value>,
    ) -> StreamRequest {
        let body = TemplateProcessRequest {
            workspace_id: workspace_id.to_string(),
            template_id: template_id.to_string(),
            user_input: user_input.to_string(),
            additional_context,
            stream: true,
        };
        StreamRequest::post("/api/templates/process", to_json(&body))
    }

    /// Ask a question and wait for the whole answer
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server rejects it, or the
    /// response is not a chat response.
    pub async fn query(
        &self,
        workspace_id: &str,
        prompt: &str,
        model: Option<&str>,
        image: Option<&Attachment>,
    ) -> Result<ChatResponse, ApiError> {
        let body = self.chat_body(prompt, model, image, false);
        self.post_json(&Self::chat_path(workspace_id), &body).await
    }

    /// Run a template and wait for the whole result
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server rejects it, or the
    /// response is not a template result.
    pub async fn process_template(
        &self,
        workspace_id: &str,
        template_id: &str,
        user_input: &str,
        additional_context: Map<String, Value>,
    ) -> Result<TemplateResult, ApiError> {
        let body = TemplateProcessRequest {
            workspace_id: workspace_id.to_string(),
            template_id: template_id.to_string(),
            user_input: user_input.to_string(),
            additional_context,
            stream: false,
        };
        self.post_json("/api/templates/process", &body).await
    }

    /// Check that the backend answers at all
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or answers with a
    /// non-success status.
    pub async fn health_check(&self) -> Result<(), ApiError> {
        let response = self.http_client.get(self.url("/")).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(())
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.http_client.post(self.url(path)).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

#[async_trait]
impl Transport for ApiClient {
    fn name(&self) -> &'static str {
        "AI Insights HTTP"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let url = self.url(&request.path);
        tracing::debug!(method = %request.method, url = %url, "Opening stream");

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, url = %url, "Stream request rejected");
            return Err(TransportError::Status { status, body });
        }

        Ok(response
            .bytes_stream()
            .map_err(TransportError::from)
            .boxed())
    }
}

fn to_json<T: serde::Serialize>(body: &T) -> Value {
    // Request bodies are plain structs of strings and maps; this cannot fail.
    serde_json::to_value(body).unwrap_or(Value::Null)
}
