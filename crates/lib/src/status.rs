//! Owner availability: a single status token shared by the reply engine and the command surfaces.
//!
//! Any string is a valid token. Only [`AVAILABLE`] has meaning to the engine (it suppresses replies).

use std::sync::Arc;
use tokio::sync::RwLock;

/// Token that marks the owner as reachable; the engine never replies while this is set.
pub const AVAILABLE: &str = "available";

/// In-memory status holder. Clone the `Arc` to share one store between the engine and its controllers.
pub struct StatusStore {
    inner: Arc<RwLock<String>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(AVAILABLE)
    }
}

impl StatusStore {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.into())),
        }
    }

    /// Current status token.
    pub async fn get(&self) -> String {
        self.inner.read().await.clone()
    }

    /// Replace the status (last write wins). Returns the previous token.
    pub async fn set(&self, status: impl Into<String>) -> String {
        let status = status.into();
        let mut g = self.inner.write().await;
        let previous = std::mem::replace(&mut *g, status);
        log::info!("status: changed from {:?} to {:?}", previous, *g);
        previous
    }

    /// True when the owner is available (exact match on [`AVAILABLE`]).
    pub async fn is_available(&self) -> bool {
        *self.inner.read().await == AVAILABLE
    }
}
