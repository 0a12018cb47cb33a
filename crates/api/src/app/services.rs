use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use reprocessor_infra::{
    ConfigSource, CustomerReprocessor, DocumentStore, EnvConfig, InMemoryDocumentStore,
    InMemoryQueue, MessageQueue, OrderReprocessor, PostgresDocumentStore,
};

pub type SharedStore = Arc<dyn DocumentStore>;
pub type SharedQueue = Arc<dyn MessageQueue>;
pub type SharedConfig = Arc<dyn ConfigSource>;

/// Reprocessors for every domain the API serves.
#[derive(Clone)]
pub struct AppServices {
    pub customers: CustomerReprocessor<SharedStore, SharedQueue, SharedConfig>,
    pub orders: OrderReprocessor<SharedStore, SharedQueue, SharedConfig>,
}

impl AppServices {
    /// Both domains share one store, queue client, and config source.
    pub fn new(store: SharedStore, queue: SharedQueue, config: SharedConfig) -> Self {
        Self {
            customers: CustomerReprocessor::new(store.clone(), queue.clone(), config.clone()),
            orders: OrderReprocessor::new(store, queue, config),
        }
    }
}

/// Wire services from the environment.
///
/// `USE_PERSISTENT_STORES=true` selects Postgres (`DATABASE_URL`) and, with
/// the `redis` feature, Redis Streams (`REDIS_URL`). Otherwise everything is
/// in memory.
pub async fn build_services() -> anyhow::Result<AppServices> {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let config: SharedConfig = Arc::new(EnvConfig::from_env());

    if !use_persistent {
        info!("using in-memory document store and queue");
        return Ok(AppServices::new(
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryQueue::new()),
            config,
        ));
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
    // `connect` also creates the documents table.
    let store = PostgresDocumentStore::connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(AppServices::new(Arc::new(store), build_queue()?, config))
}

#[cfg(feature = "redis")]
fn build_queue() -> anyhow::Result<SharedQueue> {
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let queue = reprocessor_infra::RedisStreamsQueue::new(&redis_url)
        .context("failed to create Redis client")?;
    info!("publishing to Redis Streams");
    Ok(Arc::new(queue))
}

#[cfg(not(feature = "redis"))]
fn build_queue() -> anyhow::Result<SharedQueue> {
    warn!("USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory queue");
    Ok(Arc::new(InMemoryQueue::new()))
}
