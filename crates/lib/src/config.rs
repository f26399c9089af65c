//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.deputy/config.json`) and environment.
//! Every field has a default, so `{}` (or no file at all) is a working config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::conversation::DEFAULT_HISTORY_WINDOW;
use crate::engine::DEFAULT_MAX_OUTPUT_TOKENS;
use crate::status::AVAILABLE;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:latest";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Owner defaults (initial status).
    #[serde(default)]
    pub owner: OwnerConfig,

    /// Reply model settings.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000; PORT env overrides).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback). "token" = require a bearer token on /status and /inbound.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret. Overridden by DEPUTY_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    #[default]
    None,
    Token,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Owner settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerConfig {
    /// Status at startup (default "available"). DEPUTY_STATUS or USER_STATUS env overrides.
    pub initial_status: Option<String>,
}

/// Which completion backend answers messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Anthropic,
    Ollama,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Anthropic => "anthropic",
            Backend::Ollama => "ollama",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Backend::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Backend::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

/// Reply model settings (backend, model, token cap, workspace).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub default_backend: Backend,
    /// Model id passed as-is to the backend. Empty or absent uses the backend default.
    pub default_model: Option<String>,
    /// Cap on generated tokens per reply (default 100).
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Anthropic API base (default https://api.anthropic.com). The key comes from ANTHROPIC_API_KEY.
    pub anthropic_base_url: Option<String>,
    /// Ollama base URL (default http://127.0.0.1:11434).
    pub ollama_base_url: Option<String>,
    /// Workspace root (default ~/.deputy/workspace). A POLICY.md here overrides the bundled policy.
    pub workspace: Option<PathBuf>,
    /// Optional deadline for one reply, in seconds. Absent = wait for the backend.
    pub reply_deadline_secs: Option<u64>,
}

fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_backend: Backend::default(),
            default_model: None,
            max_output_tokens: default_max_output_tokens(),
            anthropic_base_url: None,
            ollama_base_url: None,
            workspace: None,
            reply_deadline_secs: None,
        }
    }
}

/// Per-channel config plus settings shared by all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    /// Messages kept per conversation as reply context (default 10).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Answer group chats too (default false).
    #[serde(default)]
    pub reply_to_groups: bool,
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            reply_to_groups: false,
            telegram: TelegramChannelConfig::default(),
        }
    }
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
    /// The owner's Telegram user id; their messages are treated as commands or manual replies.
    pub owner_user_id: Option<i64>,
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the gateway token: env DEPUTY_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    non_empty_env("DEPUTY_GATEWAY_TOKEN").or_else(|| non_empty(&config.gateway.auth.token))
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN").or_else(|| non_empty(&config.channels.telegram.bot_token))
}

/// Anthropic API key from ANTHROPIC_API_KEY. Never stored in the config file.
pub fn resolve_anthropic_api_key() -> Option<String> {
    non_empty_env("ANTHROPIC_API_KEY")
}

/// Initial status: DEPUTY_STATUS, then USER_STATUS, then owner.initialStatus, then "available".
/// An explicitly empty config value is kept (any token is valid).
pub fn resolve_initial_status(config: &Config) -> String {
    non_empty_env("DEPUTY_STATUS")
        .or_else(|| non_empty_env("USER_STATUS"))
        .or_else(|| config.owner.initial_status.clone())
        .unwrap_or_else(|| AVAILABLE.to_string())
}

/// Model id for the configured backend, falling back to the backend default.
pub fn resolve_model(agents: &AgentsConfig) -> String {
    non_empty(&agents.default_model)
        .unwrap_or_else(|| agents.default_backend.default_model().to_string())
}

/// Apply the PORT env var (hosting platforms set it) over the configured port.
pub fn apply_port_env(config: &mut Config) {
    if let Some(port) = non_empty_env("PORT").and_then(|p| p.parse::<u16>().ok()) {
        config.gateway.port = port;
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DEPUTY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".deputy").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Directory holding the config file ("." when the path has no parent).
pub fn config_dir(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve workspace directory: agents.workspace, else `workspace` next to the config file.
pub fn resolve_workspace_dir(config: &Config, config_path: &Path) -> PathBuf {
    match &config.agents.workspace {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_dir(config_path).join(d)
            }
        }
        _ => config_dir(config_path).join("workspace"),
    }
}

/// Load config from the given path, or the default path (or DEPUTY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
