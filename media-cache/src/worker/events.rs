use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheEventKind {
    CacheHit,
    CacheMiss,
    CacheStored,
}

/// Notification broadcast from the worker to every open page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    #[serde(rename = "type")]
    pub kind: CacheEventKind,
    pub url: String,
    /// Milliseconds since the Unix epoch.
    pub time: u64,
}

/// Fire-and-forget fan-out of cache events.
///
/// Delivery is at most once: with no subscribers the event is dropped, and a
/// subscriber that falls behind loses the oldest events. Nothing may depend
/// on an event arriving.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers the event reached.
    pub fn publish(&self, event: CacheEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }
}
