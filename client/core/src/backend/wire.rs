//! Request and response bodies of the AI Insights REST API

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::{Attachment, RequestId};

/// Body of `POST /api/chat/{workspace_id}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Client-generated request ID, echoed back in stream events
    pub id: RequestId,
    /// The question
    pub prompt: String,
    /// Model to answer with
    pub model: String,
    /// Whether to stream the answer as events
    pub stream: bool,
    /// Image attachment as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Attachment>,
}

/// Body of `POST /api/templates/process`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateProcessRequest {
    /// Workspace whose documents the template runs against
    pub workspace_id: String,
    /// Template to run
    pub template_id: String,
    /// Free-form input substituted into the template
    pub user_input: String,
    /// Extra template variables
    pub additional_context: Map<String, Value>,
    /// Whether to stream the result as events
    pub stream: bool,
}

/// Non-streaming chat response
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatResponse {
    /// Request ID
    pub id: String,
    /// The full answer
    pub response: String,
}

/// Non-streaming template response
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TemplateResult {
    /// The generated text
    pub result: String,
    /// Retrieval metadata (sources and scores)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A document the answer drew on
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Source {
    /// Document name or path
    pub source: String,
    /// Retrieval similarity score
    #[serde(default)]
    pub score: f64,
}

impl Source {
    /// Sources listed under `metadata.sources`; malformed entries are skipped
    #[must_use]
    pub fn from_metadata(metadata: &Map<String, Value>) -> Vec<Self> {
        metadata
            .get("sources")
            .and_then(Value::as_array)
            .map(|sources| {
                sources
                    .iter()
                    .filter_map(|s| serde_json::from_value(s.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (Score: {:.2})", self.source, self.score)
    }
}
