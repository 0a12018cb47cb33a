//! Document store boundary.
//!
//! The orchestrator reads and updates failed records through
//! [`DocumentStore`]. Filters, updates and projections are the semantic
//! expressions from `reprocessor-core`; each adapter compiles them to its own
//! query language.

pub mod in_memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use thiserror::Error;

use reprocessor_core::{Filter, Projection, Update};

pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateAck {
    /// Documents matching the filter (0 or 1).
    pub matched: u64,
    /// Documents whose content changed.
    pub modified: u64,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("stored document could not be decoded: {0}")]
    Decode(String),

    #[error("store {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Collection-scoped document access.
///
/// `find_many` returns documents in the store's natural order.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<JsonValue>, StoreError>;

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
        limit: Option<usize>,
    ) -> Result<Vec<JsonValue>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Apply `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateAck, StoreError>;
}

#[async_trait::async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<JsonValue>, StoreError> {
        (**self).find_one(collection, filter, projection).await
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
        limit: Option<usize>,
    ) -> Result<Vec<JsonValue>, StoreError> {
        (**self).find_many(collection, filter, projection, limit).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        (**self).count(collection, filter).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateAck, StoreError> {
        (**self).update_one(collection, filter, update).await
    }
}

/// Bound a store call by `after`.
pub async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| StoreError::Timeout { operation, after })?
}
