use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

const CHANNEL_CAPACITY: usize = 64;

/// Events observable on a session topic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// A student was marked present; `count` is the live total at emit time.
    AttendanceMarked {
        session_id: String,
        user_id: i64,
        count: u64,
    },
    /// The session closed; no further check-ins will be admitted.
    SessionClosed { session_id: String, total: u64 },
}

/// Per-session broadcast channels, keyed `attendance:session:{id}`.
///
/// Subscribers get every event emitted after they subscribe; slow consumers
/// that fall behind the channel capacity observe `Lagged` and can fall back
/// to polling `count_for_session`, which stays idempotent.
#[derive(Default)]
pub struct SessionEventBus {
    topics: RwLock<HashMap<String, broadcast::Sender<SessionEvent>>>,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<SessionEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic_path(session_id))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivery is best-effort: no subscribers means the event is dropped.
    pub async fn emit(&self, session_id: &str, event: SessionEvent) {
        let topics = self.topics.read().await;
        if let Some(sender) = topics.get(&topic_path(session_id)) {
            let _ = sender.send(event);
        }
    }

    /// Drops the topic; existing receivers see the channel close after
    /// draining buffered events.
    pub async fn remove_topic(&self, session_id: &str) {
        let mut topics = self.topics.write().await;
        topics.remove(&topic_path(session_id));
    }
}

fn topic_path(session_id: &str) -> String {
    format!("attendance:session:{session_id}")
}
