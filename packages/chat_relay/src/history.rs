//! Append-only log of every accepted message, replayed to joining peers.
//!
//! Unbounded on purpose: the log lives as long as the process and is only
//! reset by a restart.

use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: RwLock<Vec<String>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return the new length.
    pub async fn append(&self, message: String) -> usize {
        let mut entries = self.entries.write().await;
        entries.push(message);
        entries.len()
    }

    /// All entries, oldest first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
