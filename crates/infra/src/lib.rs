//! Infrastructure layer: document store, message queue, configuration, and
//! the reprocessing orchestrator that ties them together.

pub mod config;
pub mod document_store;
pub mod queue;
pub mod reprocessor;

mod integration_tests;

pub use config::{ConfigError, ConfigSource, EnvConfig, ReprocessConfig, StaticConfig};
pub use document_store::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, StoreError, UpdateAck};
pub use queue::{InMemoryQueue, MessageQueue, PublishAck, QueueError};
pub use reprocessor::{BatchSummary, RecordFailure, ReprocessError, ReprocessStatus, Reprocessor, SingleSummary};

#[cfg(feature = "redis")]
pub use queue::RedisStreamsQueue;

use reprocessor_customers::CustomerSchema;
use reprocessor_orders::OrderSchema;

/// Customer reprocessor over any store/queue/config.
pub type CustomerReprocessor<D, Q, C> = Reprocessor<CustomerSchema, D, Q, C>;

/// Order reprocessor over any store/queue/config.
pub type OrderReprocessor<D, Q, C> = Reprocessor<OrderSchema, D, Q, C>;
