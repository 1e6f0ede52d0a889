//! Typed event bus for status and progress fan-out.
//!
//! Broadcast channels replace ad hoc callback registries: any number of
//! independent consumers subscribe, a dropped or lagging receiver never
//! affects the others, and tests can assert on emitted sequences. Dropping
//! the receiver is the unsubscribe.

use tokio::sync::broadcast;

use treelink_core::types::SyncStatus;

/// One progress tick of a running sync (paths done, paths total, message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
    pub message: String,
}

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    status_tx: broadcast::Sender<SyncStatus>,
    progress_tx: broadcast::Sender<Progress>,
}

impl EventBus {
    pub fn new() -> Self {
        let (status_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (progress_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            status_tx,
            progress_tx,
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Publish a status snapshot. Send errors mean "no subscribers" and are
    /// deliberately ignored.
    pub fn publish_status(&self, status: &SyncStatus) {
        let _ = self.status_tx.send(status.clone());
    }

    pub fn publish_progress(&self, progress: Progress) {
        let _ = self.progress_tx.send(progress);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
