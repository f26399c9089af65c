//! Short per-conversation history kept in memory on the transport side.
//!
//! Each (channel_id, conversation_id) keeps at most `window` entries; older ones fall off.
//! Nothing is persisted: a restart starts every conversation with an empty window.

use crate::history::HistoryEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Channel side of a conversation (channel id + conversation id, e.g. telegram chat_id).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ChannelConvKey {
    pub channel_id: String,
    pub conversation_id: String,
}

impl ChannelConvKey {
    pub fn new(channel_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// Bounded history windows, one per conversation.
pub struct ConversationLog {
    window: usize,
    inner: Arc<RwLock<HashMap<ChannelConvKey, VecDeque<HistoryEntry>>>>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl ConversationLog {
    /// `window` of 0 disables history entirely.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot of the conversation, oldest first.
    pub async fn window(&self, key: &ChannelConvKey) -> Vec<HistoryEntry> {
        self.inner
            .read()
            .await
            .get(key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append one entry, dropping the oldest when the window is full.
    pub async fn record(&self, key: &ChannelConvKey, entry: HistoryEntry) {
        if self.window == 0 {
            return;
        }
        let mut g = self.inner.write().await;
        let q = g.entry(key.clone()).or_default();
        q.push_back(entry);
        while q.len() > self.window {
            q.pop_front();
        }
    }

    /// Snapshot the window, then record `entry`. The returned history excludes `entry`.
    pub async fn snapshot_and_record(
        &self,
        key: &ChannelConvKey,
        entry: HistoryEntry,
    ) -> Vec<HistoryEntry> {
        if self.window == 0 {
            return Vec::new();
        }
        let mut g = self.inner.write().await;
        let q = g.entry(key.clone()).or_default();
        let snapshot = q.iter().cloned().collect();
        q.push_back(entry);
        while q.len() > self.window {
            q.pop_front();
        }
        snapshot
    }

    /// Number of conversations with any history.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
