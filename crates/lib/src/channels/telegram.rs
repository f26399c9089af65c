//! Telegram channel: long-poll getUpdates (or webhook) and sendMessage via Bot API.
//!
//! Besides plain bot chats this handles `business_message` updates: with the bot connected to the
//! owner's Telegram Business account, replies go out as the owner in their private chats.

use crate::channels::inbound::InboundEvent;
use crate::channels::registry::{ChannelError, ChannelHandle};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const ALLOWED_UPDATES: [&str; 2] = ["message", "business_message"];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub business_message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub business_connection_id: Option<String>,
    /// Set on messages this bot sent on the owner's behalf; Telegram echoes them back as updates.
    #[serde(default)]
    pub sender_business_bot: Option<TelegramUser>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel".
    #[serde(rename = "type", default)]
    pub typ: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    /// Full name, else @username, else the numeric id.
    fn label(&self) -> String {
        let name = match &self.last_name {
            Some(last) if !last.trim().is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        };
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        match &self.username {
            Some(u) if !u.is_empty() => format!("@{}", u),
            _ => self.id.to_string(),
        }
    }
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    owner_user_id: Option<i64>,
    running: AtomicBool,
    client: reqwest::Client,
    /// chat_id -> business_connection_id for chats seen through a business connection.
    business_routes: RwLock<HashMap<String, String>>,
}

impl TelegramChannel {
    pub fn new(token: Option<String>, owner_user_id: Option<i64>) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: telegram_api_base(),
            owner_user_id,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
            business_routes: RwLock::new(HashMap::new()),
        }
    }

    /// Override the Bot API base URL (tests, local Bot API servers).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> Result<String, ChannelError> {
        let token = self
            .token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("telegram bot token"))?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        body: &serde_json::Value,
    ) -> Result<Option<T>, ChannelError> {
        let url = self.method_url(method)?;
        let res = self.client.post(&url).json(body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                method,
                detail: format!("{} {}", status, text),
            });
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(ChannelError::Api {
                method,
                detail: data.description.unwrap_or_else(|| "ok: false".to_string()),
            });
        }
        Ok(data.result)
    }

    /// Start the getUpdates long-poll loop and forward messages to the gateway. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ALLOWED_UPDATES,
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?.unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Turn an update into an inbound event. Remembers business connections so replies can use them.
    /// Updates without text and echoes of our own business replies are dropped.
    pub async fn accept_update(&self, update: TelegramUpdate) -> Option<InboundEvent> {
        let (msg, via_business) = match (update.business_message, update.message) {
            (Some(m), _) => (m, true),
            (None, Some(m)) => (m, false),
            (None, None) => return None,
        };
        if msg.sender_business_bot.is_some() {
            log::debug!("telegram: skipping echo of business reply in {}", msg.chat.id);
            return None;
        }
        let text = msg.text?;
        let chat_id = msg.chat.id.to_string();
        let is_group = msg.chat.typ != "private" && !msg.chat.typ.is_empty();
        if let Some(conn) = msg.business_connection_id {
            self.business_routes
                .write()
                .await
                .insert(chat_id.clone(), conn);
        }
        let (sender_label, from_id) = match &msg.from {
            Some(u) => (u.label(), Some(u.id)),
            None => (chat_id.clone(), None),
        };
        let is_owner = matches!((from_id, self.owner_user_id), (Some(f), Some(o)) if f == o);
        // In a private business chat the chat id is the other party; anything else is the owner typing.
        let owner_in_business_chat =
            via_business && !is_group && from_id.is_some_and(|f| f != msg.chat.id);
        Some(InboundEvent {
            channel_id: self.id.clone(),
            conversation_id: chat_id,
            sender_label,
            text,
            from_self: is_owner || owner_in_business_chat,
            is_group,
        })
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "url": url, "allowed_updates": ALLOWED_UPDATES });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        self.call::<serde_json::Value>("setWebhook", &body).await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>("deleteWebhook", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Send a text message to a chat via sendMessage, through the business connection when the chat came from one.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(conn) = self.business_routes.read().await.get(chat_id) {
            body["business_connection_id"] = serde_json::Value::String(conn.clone());
        }
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundEvent>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(event) = channel.accept_update(u).await else {
                        continue;
                    };
                    if inbound_tx.send(event).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }
}

/// Resolve Telegram bot API base URL (TELEGRAM_API_BASE env, for tests or custom endpoints).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| TELEGRAM_API_BASE.to_string())
}
