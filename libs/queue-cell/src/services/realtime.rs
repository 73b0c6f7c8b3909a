use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::QueueEvent;

pub type QueueEventSender = broadcast::Sender<String>;
pub type QueueEventReceiver = broadcast::Receiver<String>;

const QUEUE_CHANNEL_CAPACITY: usize = 100;
const GLOBAL_CHANNEL_CAPACITY: usize = 1000;

/// Fan-out of queue events to realtime subscribers, one broadcast channel
/// per queue plus a global feed for monitoring.
pub struct QueueEventHub {
    channels: Arc<RwLock<HashMap<Uuid, QueueEventSender>>>,
    global_sender: QueueEventSender,
}

impl QueueEventHub {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);

        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global_sender,
        }
    }

    /// Subscribes to a queue, creating its channel on first use.
    pub async fn subscribe(&self, queue_id: Uuid) -> QueueEventReceiver {
        let mut channels = self.channels.write().await;
        let sender = channels.entry(queue_id).or_insert_with(|| {
            debug!("Created realtime channel for queue {}", queue_id);
            broadcast::channel(QUEUE_CHANNEL_CAPACITY).0
        });
        sender.subscribe()
    }

    pub async fn remove_channel(&self, queue_id: Uuid) {
        let mut channels = self.channels.write().await;
        if channels.remove(&queue_id).is_some() {
            debug!("Removed realtime channel for queue {}", queue_id);
        }
    }

    /// Serializes the event once and hands it to every subscriber of the
    /// queue. Returns how many queue subscribers received it.
    pub async fn publish(&self, event: &QueueEvent) -> usize {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to serialize queue event for {}: {}", event.queue_id, e);
                return 0;
            }
        };

        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(&event.queue_id) {
                Some(sender) => sender.send(message.clone()).unwrap_or(0),
                None => 0,
            }
        };

        let global_message = serde_json::json!({
            "type": "queue_update",
            "queue_id": event.queue_id,
            "timestamp": Utc::now().to_rfc3339(),
            "data": event,
        })
        .to_string();

        if let Err(e) = self.global_sender.send(global_message) {
            debug!("No global subscribers: {}", e);
        }

        debug!("Published queue event for {} to {} subscriber(s)", event.queue_id, delivered);
        delivered
    }

    pub fn subscribe_global(&self) -> QueueEventReceiver {
        self.global_sender.subscribe()
    }

    pub async fn active_channels(&self) -> Vec<Uuid> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }

    pub async fn subscriber_count(&self, queue_id: Uuid) -> usize {
        let channels = self.channels.read().await;
        channels.get(&queue_id).map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Drops channels nobody listens to any more.
    pub async fn prune_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }
}

impl Default for QueueEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QueueEventHub {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            global_sender: self.global_sender.clone(),
        }
    }
}
