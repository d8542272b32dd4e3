//! Sync status broadcast.

use chrono::{DateTime, Utc};
use quill_protocol::Revision;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Per-key synchronization state changes, published as writes settle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// The write reached the server; `revision` is the new CAS token.
    Synced {
        key: String,
        revision: Option<Revision>,
    },
    /// Transient failure; a retry is queued.
    Queued {
        key: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// The server rejected a stale revision; the cache was re-hydrated.
    Conflicted { key: String },
    /// Permanent failure; the optimistic local copy is kept and flagged.
    Unsynced { key: String },
    /// Retry budget exhausted; the local copy stays flagged for resync.
    Dropped { key: String, attempts: u32 },
}

impl SyncStatus {
    pub fn key(&self) -> &str {
        match self {
            Self::Synced { key, .. }
            | Self::Queued { key, .. }
            | Self::Conflicted { key }
            | Self::Unsynced { key }
            | Self::Dropped { key, .. } => key,
        }
    }
}

/// Broadcast hub for sync status events.
#[derive(Clone, Debug)]
pub struct SyncStatusHub {
    sender: broadcast::Sender<SyncStatus>,
}

impl SyncStatusHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn publish(&self, status: SyncStatus) {
        let _ = self.sender.send(status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<SyncStatus> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_statuses() {
        let hub = SyncStatusHub::new(8);
        let mut rx = hub.subscribe();
        hub.publish(SyncStatus::Unsynced {
            key: "doc-1".into(),
        });
        let status = rx.recv().await.unwrap();
        assert_eq!(status.key(), "doc-1");
    }
}
