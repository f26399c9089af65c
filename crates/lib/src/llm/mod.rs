//! Completion service abstraction and HTTP clients (Anthropic Messages API, Ollama).
//!
//! The reply engine only sees [`CompletionService`]: one request in, an ordered list of content
//! segments out. Retries and backoff are left to whoever wraps the service.

mod anthropic;
mod ollama;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One completion call: system instruction plus a single user content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub model: String,
    pub max_output_tokens: u32,
    pub system_instruction: String,
    pub user_content: String,
}

/// One segment of a completion response. Only text matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    Text(String),
    /// Non-text content (tool use, thinking, ...), identified by its type name.
    Other(String),
}

/// Completion result: content segments in the order the provider returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: Vec<ContentSegment>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentSegment::Text(text.into())],
        }
    }

    /// The first text segment, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|s| match s {
            ContentSegment::Text(t) => Some(t.as_str()),
            ContentSegment::Other(_) => None,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("completion api rejected credentials")]
    Auth,
    #[error("completion api rate limited")]
    RateLimited,
    #[error("failed to decode completion response: {0}")]
    Decode(String),
    #[error("completion backend not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Map a non-success HTTP status to an error. 401/403 and 429 get their own kinds.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Auth,
            429 => LlmError::RateLimited,
            code => LlmError::Api { status: code, body },
        }
    }
}

/// A language model that turns one request into content segments.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Backend id (e.g. "anthropic").
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
