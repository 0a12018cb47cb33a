//! Message queue boundary.
//!
//! Records that are retried are republished to the queue the downstream
//! consumer reads from. Delivery is at-least-once; the message dedup key lets
//! backends that support it drop repeats.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_streams;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use reprocessor_core::OutboundMessage;

pub use in_memory::InMemoryQueue;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsQueue;

/// Broker acknowledgement of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub message_id: String,
    /// The broker dropped the message as a repeat of an earlier dedup key.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue connection error: {0}")]
    Connection(String),

    #[error("queue rejected message: {0}")]
    Rejected(String),

    #[error("queue publish timed out after {after:?}")]
    Timeout { after: Duration },
}

#[async_trait::async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish `message` to `target` (queue URL or stream name).
    async fn publish(&self, target: &str, message: &OutboundMessage) -> Result<PublishAck, QueueError>;
}

#[async_trait::async_trait]
impl<T: MessageQueue + ?Sized> MessageQueue for Arc<T> {
    async fn publish(&self, target: &str, message: &OutboundMessage) -> Result<PublishAck, QueueError> {
        (**self).publish(target, message).await
    }
}

/// Bound a publish by `after`.
pub async fn with_timeout<T>(
    after: Duration,
    call: impl Future<Output = Result<T, QueueError>>,
) -> Result<T, QueueError> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| QueueError::Timeout { after })?
}
