//! Redis Streams-backed message queue.
//!
//! Each publish target is a stream key. A message becomes one `XADD` entry with
//! fields `body`, `group`, `dedup` and one `attr:<name>` field per attribute.
//!
//! De-duplication follows FIFO-queue semantics: a `SET NX EX` marker per
//! `(stream, dedup key)` suppresses repeats inside the dedup window. The
//! marker is released again when the append fails, so a retried publish is
//! not mistaken for a duplicate.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use reprocessor_core::OutboundMessage;

use super::{MessageQueue, PublishAck, QueueError};

/// Window during which a repeated dedup key is dropped (five minutes).
const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// The three stream commands a publish needs.
trait StreamCommands {
    /// `SET marker 1 NX EX window`; `true` when the marker was newly set.
    fn claim_dedup(&mut self, marker: &str, window: Duration) -> Result<bool, QueueError>;
    fn release_dedup(&mut self, marker: &str) -> Result<(), QueueError>;
    /// `XADD`; returns the entry id.
    fn append(&mut self, stream_key: &str, message: &OutboundMessage) -> Result<String, QueueError>;
}

impl StreamCommands for redis::Connection {
    fn claim_dedup(&mut self, marker: &str, window: Duration) -> Result<bool, QueueError> {
        let fresh: Option<String> = redis::cmd("SET")
            .arg(marker)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(window.as_secs().max(1))
            .query(self)
            .map_err(|e| QueueError::Connection(format!("SET NX failed: {e}")))?;
        Ok(fresh.is_some())
    }

    fn release_dedup(&mut self, marker: &str) -> Result<(), QueueError> {
        redis::cmd("DEL")
            .arg(marker)
            .query::<i64>(self)
            .map(|_| ())
            .map_err(|e| QueueError::Connection(format!("DEL failed: {e}")))
    }

    fn append(&mut self, stream_key: &str, message: &OutboundMessage) -> Result<String, QueueError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_key).arg("*").arg("body").arg(&message.body);
        if let Some(group) = &message.group_key {
            cmd.arg("group").arg(group);
        }
        if let Some(key) = &message.dedup_key {
            cmd.arg("dedup").arg(key);
        }
        for (name, value) in &message.attributes {
            cmd.arg(format!("attr:{name}")).arg(value);
        }

        cmd.query(self)
            .map_err(|e| QueueError::Rejected(format!("XADD failed: {e}")))
    }
}

fn dedup_marker(stream_key: &str, dedup_key: &str) -> String {
    format!("{stream_key}:dedup:{dedup_key}")
}

/// Claim the dedup marker (if any), append, and release the marker when the
/// append fails.
fn publish_on<C: StreamCommands>(
    conn: &mut C,
    stream_key: &str,
    message: &OutboundMessage,
    dedup_window: Duration,
) -> Result<PublishAck, QueueError> {
    let marker = message
        .dedup_key
        .as_deref()
        .map(|key| dedup_marker(stream_key, key));

    if let Some(marker) = &marker {
        if !conn.claim_dedup(marker, dedup_window)? {
            warn!(dedup_marker = %marker, "duplicate message dropped");
            return Ok(PublishAck {
                message_id: marker.clone(),
                duplicate: true,
            });
        }
    }

    match conn.append(stream_key, message) {
        Ok(message_id) => {
            debug!(message_id = %message_id, "message appended");
            Ok(PublishAck {
                message_id,
                duplicate: false,
            })
        }
        Err(e) => {
            if let Some(marker) = &marker {
                if let Err(release) = conn.release_dedup(marker) {
                    warn!(dedup_marker = %marker, error = %release, "failed to release dedup marker");
                }
            }
            Err(e)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisStreamsQueue {
    client: Arc<redis::Client>,
    dedup_window: Duration,
}

impl RedisStreamsQueue {
    /// Create a new queue client.
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            dedup_window: DEFAULT_DEDUP_WINDOW,
        })
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    #[instrument(skip(self, message), fields(stream_key = %stream_key), err)]
    fn publish_sync(&self, stream_key: &str, message: &OutboundMessage) -> Result<PublishAck, QueueError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        publish_on(&mut conn, stream_key, message, self.dedup_window)
    }
}

#[async_trait::async_trait]
impl MessageQueue for RedisStreamsQueue {
    async fn publish(&self, target: &str, message: &OutboundMessage) -> Result<PublishAck, QueueError> {
        let this = self.clone();
        let target = target.to_string();
        let message = message.clone();
        tokio::task::spawn_blocking(move || this.publish_sync(&target, &message))
            .await
            .map_err(|e| QueueError::Connection(format!("publish task failed: {e}")))?
    }
}
