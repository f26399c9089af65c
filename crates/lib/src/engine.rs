//! Reply engine: decide whether to answer an inbound message and, if so, generate the answer.
//!
//! Per message: read status -> suppressed when available, otherwise format history, build the
//! system prompt, make exactly one completion request and return its first text segment.
//! Nothing is retried and nothing survives past one call.

use crate::config::{self, Backend, Config};
use crate::history::{format_history, HistoryEntry};
use crate::llm::{AnthropicClient, CompletionRequest, CompletionService, LlmError, OllamaClient};
use crate::prompt;
use crate::status::StatusStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 100;

/// A message to consider for an auto-reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Transport label, e.g. "WhatsApp" or "telegram".
    pub channel: String,
    /// Display name or identifier of the sender.
    pub sender_label: String,
    pub text: String,
    /// Earlier messages of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Outcome of one engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDecision {
    /// Owner is available; nothing to send.
    Suppressed,
    Generated(String),
}

impl ReplyDecision {
    pub fn into_reply(self) -> Option<String> {
        match self {
            ReplyDecision::Suppressed => None,
            ReplyDecision::Generated(text) => Some(text),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error(transparent)]
    CompletionRequestFailed(#[from] LlmError),
    #[error("completion response contained no text")]
    EmptyCompletionResponse,
    #[error("no completion within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Engine settings that do not change per message.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub max_output_tokens: u32,
    /// Policy template with `{{status}}` and `{{transcript}}` placeholders.
    pub policy: String,
}

/// Stateless apart from the shared status store; safe to call from many tasks at once.
#[derive(Clone)]
pub struct ReplyEngine {
    status: Arc<StatusStore>,
    completion: Arc<dyn CompletionService>,
    settings: Arc<EngineSettings>,
}

impl ReplyEngine {
    pub fn new(
        status: Arc<StatusStore>,
        completion: Arc<dyn CompletionService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            status,
            completion,
            settings: Arc::new(settings),
        }
    }

    /// Engine for the configured model, token cap and policy (workspace POLICY.md or the bundled one).
    pub fn from_config(
        config: &Config,
        config_path: &Path,
        status: Arc<StatusStore>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        let workspace = config::resolve_workspace_dir(config, config_path);
        let settings = EngineSettings {
            model: config::resolve_model(&config.agents),
            max_output_tokens: config.agents.max_output_tokens,
            policy: prompt::load_policy(Some(&workspace)),
        };
        Self::new(status, completion, settings)
    }

    pub fn status(&self) -> &Arc<StatusStore> {
        &self.status
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Build the completion request for a message under the given status.
    pub fn build_request(&self, msg: &InboundMessage, status: &str) -> CompletionRequest {
        let transcript = format_history(&msg.history);
        CompletionRequest {
            model: self.settings.model.clone(),
            max_output_tokens: self.settings.max_output_tokens,
            system_instruction: prompt::build_system_prompt(
                &self.settings.policy,
                &transcript,
                status,
            ),
            user_content: prompt::user_content(&msg.sender_label, &msg.text),
        }
    }

    /// Decide and, when the owner is not available, generate a reply.
    /// Completion failures are returned, never turned into [`ReplyDecision::Suppressed`].
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<ReplyDecision, ReplyError> {
        log::info!(
            "engine: processing {} message from {}",
            msg.channel,
            msg.sender_label
        );
        let status = self.status.get().await;
        if status == crate::status::AVAILABLE {
            log::debug!("engine: owner available, no auto-reply");
            return Ok(ReplyDecision::Suppressed);
        }

        let request = self.build_request(msg, &status);
        let response = match self.completion.complete(&request).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("engine: {} completion failed: {}", self.completion.name(), e);
                return Err(e.into());
            }
        };
        let text = response
            .first_text()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                log::warn!("engine: {} returned no text", self.completion.name());
                ReplyError::EmptyCompletionResponse
            })?;
        log::info!("engine: generated reply for {}: {}", msg.sender_label, text);
        Ok(ReplyDecision::Generated(text.to_string()))
    }

    /// [`process_message`](Self::process_message) bounded by a caller deadline.
    pub async fn process_message_with_deadline(
        &self,
        msg: &InboundMessage,
        deadline: Duration,
    ) -> Result<ReplyDecision, ReplyError> {
        match tokio::time::timeout(deadline, self.process_message(msg)).await {
            Ok(res) => res,
            Err(_) => {
                log::warn!("engine: reply for {} exceeded {:?}", msg.sender_label, deadline);
                Err(ReplyError::DeadlineExceeded(deadline))
            }
        }
    }
}

/// Completion client for `agents.defaultBackend`.
pub fn completion_service_from_config(config: &Config) -> Arc<dyn CompletionService> {
    match config.agents.default_backend {
        Backend::Anthropic => Arc::new(AnthropicClient::new(
            config.agents.anthropic_base_url.clone(),
            config::resolve_anthropic_api_key(),
        )),
        Backend::Ollama => Arc::new(OllamaClient::new(config.agents.ollama_base_url.clone())),
    }
}
