//! Ollama API client (http://127.0.0.1:11434 by default).
//! Non-streaming chat only: the reply engine needs one short answer per request.

use crate::llm::{
    CompletionRequest, CompletionResponse, CompletionService, ContentSegment, LlmError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Client for Ollama HTTP API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

fn chat_request(request: &CompletionRequest) -> ChatRequest {
    ChatRequest {
        model: request.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: request.system_instruction.clone(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: request.user_content.clone(),
            },
        ],
        stream: false,
        options: ChatOptions {
            num_predict: request.max_output_tokens,
        },
    }
}

/// Ollama returns a single message; an empty or missing one maps to no segments.
fn to_completion(data: ChatResponse) -> CompletionResponse {
    match data.message {
        Some(m) if !m.content.is_empty() => CompletionResponse {
            content: vec![ContentSegment::Text(m.content)],
        },
        _ => CompletionResponse::default(),
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    /// POST /api/chat with stream: false.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = chat_request(request);
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, body));
        }
        let data: ChatResponse = res
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(to_completion(data))
    }
}
