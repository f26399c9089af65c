//! Channel registry: register and lookup channels by id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{method} failed: {detail}")]
    Api { method: &'static str, detail: String },
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sending is not supported by channel {0}")]
    Unsupported(String),
}

/// Handle to a running channel (stop, send message).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a conversation (e.g. Telegram chat_id).
    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported(self.id().to_string()))
    }
}

/// Registry of channel ids to handles. Shared across gateway.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelHandle>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a handle under its own id. A handle already registered under that id is stopped.
    pub async fn register(&self, handle: Arc<dyn ChannelHandle>) {
        let id = handle.id().to_string();
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(id.clone(), handle) {
            log::debug!("channels: replacing {}", id);
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        let g = self.inner.read().await;
        g.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        g.keys().cloned().collect()
    }

    /// Deliver text to a conversation on the named channel.
    pub async fn send(
        &self,
        channel_id: &str,
        conversation_id: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        let handle = self
            .get(channel_id)
            .await
            .ok_or_else(|| ChannelError::Unsupported(channel_id.to_string()))?;
        handle.send_message(conversation_id, text).await
    }

    /// Stop every registered channel (shutdown).
    pub async fn stop_all(&self) {
        for handle in self.inner.read().await.values() {
            handle.stop();
        }
    }
}
