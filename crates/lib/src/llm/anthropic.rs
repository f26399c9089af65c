//! Anthropic Messages API client (POST /v1/messages, non-streaming).
//!
//! The API key never appears in logs or `Debug` output.

use crate::llm::{
    CompletionRequest, CompletionResponse, CompletionService, ContentSegment, LlmError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    /// `api_key` may be absent; requests then fail with [`LlmError::NotConfigured`].
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY is not set".to_string()))?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_output_tokens,
            system: &request.system_instruction,
            messages: vec![MessageParam {
                role: "user",
                content: &request.user_content,
            }],
        };
        log::debug!("anthropic: POST {} model={}", url, request.model);
        let res = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, body));
        }
        let data: MessagesResponse = res
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        let content = data
            .content
            .into_iter()
            .map(|b| match (b.typ.as_str(), b.text) {
                ("text", Some(text)) => ContentSegment::Text(text),
                _ => ContentSegment::Other(b.typ),
            })
            .collect();
        Ok(CompletionResponse { content })
    }
}
