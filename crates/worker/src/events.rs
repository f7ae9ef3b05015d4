//! Request lifecycle events
//!
//! The dispatcher and the server report what happened to each input frame:
//! answered (with whether the query succeeded), ignored without a reply, or
//! abandoned by a panic. Subscribers are optional. The channel is bounded,
//! so a subscriber that falls behind loses the oldest events and sees
//! `RecvError::Lagged` instead of slowing requests down.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerEvent {
    /// A recognized request produced a response
    RequestCompleted {
        request_id: Uuid,
        kind: String,
        ok: bool,
    },
    /// Frame was not a recognized request, no response sent
    RequestIgnored,
    /// Pipeline panicked, no response sent
    RequestPanicked { request_id: Uuid, kind: String },
}

/// Fan-out of `WorkerEvent`s to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<WorkerEvent>,
}

impl EventBus {
    /// Events retained for a subscriber that has not caught up yet
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Bus retaining at most `capacity` unread events per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to current subscribers, returning how many got it
    pub fn publish(&self, event: WorkerEvent) -> usize {
        if self.sender.receiver_count() == 0 {
            return 0;
        }
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
