use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reprocessor_core::OutboundMessage;

use super::{MessageQueue, PublishAck, QueueError};

#[derive(Debug, Default)]
struct QueueState {
    messages: HashMap<String, Vec<OutboundMessage>>,
    seen: HashSet<(String, String)>,
    reject_keys: HashSet<String>,
}

/// In-memory queue for tests/dev.
///
/// Messages are recorded per target. A repeated dedup key on the same target
/// is acknowledged as a duplicate and not stored again.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
    next_id: AtomicU64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any message whose dedup key is `key`.
    pub fn reject_dedup_key(&self, key: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.reject_keys.insert(key.into());
        }
    }

    /// Fail every publish with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Messages accepted on `target`, in publish order.
    pub fn messages(&self, target: &str) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .map(|s| s.messages.get(target).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Messages accepted across all targets.
    pub fn published_count(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.messages.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, target: &str, message: &OutboundMessage) -> Result<PublishAck, QueueError> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(QueueError::Connection(format!("{target} is offline")));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::Connection("lock poisoned".to_string()))?;

        if let Some(key) = &message.dedup_key {
            if state.reject_keys.contains(key) {
                return Err(QueueError::Rejected(format!("dedup key {key} rejected")));
            }
            if !state.seen.insert((target.to_string(), key.clone())) {
                return Ok(PublishAck {
                    message_id: format!("dup-{key}"),
                    duplicate: true,
                });
            }
        }

        state
            .messages
            .entry(target.to_string())
            .or_default()
            .push(message.clone());

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PublishAck {
            message_id: format!("mem-{id}"),
            duplicate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(key: &str) -> OutboundMessage {
        OutboundMessage::new("{}").with_dedup_key(key)
    }

    #[tokio::test]
    async fn repeated_dedup_key_is_dropped() {
        let queue = InMemoryQueue::new();
        let first = queue.publish("q", &msg("O-1")).await.unwrap();
        let second = queue.publish("q", &msg("O-1")).await.unwrap();
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(queue.messages("q").len(), 1);

        // Dedup is per target.
        queue.publish("other", &msg("O-1")).await.unwrap();
        assert_eq!(queue.published_count(), 2);
    }

    #[tokio::test]
    async fn injected_rejection_and_outage() {
        let queue = InMemoryQueue::new();
        queue.reject_dedup_key("bad");
        assert!(matches!(
            queue.publish("q", &msg("bad")).await,
            Err(QueueError::Rejected(_))
        ));

        queue.set_offline(true);
        assert!(matches!(
            queue.publish("q", &msg("ok")).await,
            Err(QueueError::Connection(_))
        ));
        assert_eq!(queue.published_count(), 0);
    }
}
