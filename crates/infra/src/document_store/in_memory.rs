use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde_json::Value as JsonValue;

use reprocessor_core::{Filter, Projection, Update};

use super::{DocumentStore, StoreError, UpdateAck};

/// In-memory document store.
///
/// Intended for tests/dev. Documents keep insertion order, which is the
/// natural order `find_many` returns. Failures and latency can be injected to
/// exercise the orchestrator's error paths.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<JsonValue>>>,
    fail_updates: AtomicBool,
    latency_ms: AtomicU64,
    reads: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, collection: &str, doc: JsonValue) -> Result<(), StoreError> {
        self.collections
            .write()
            .map_err(|_| poisoned())?
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    /// Snapshot of every document in `collection`.
    pub fn documents(&self, collection: &str) -> Result<Vec<JsonValue>, StoreError> {
        Ok(self
            .collections
            .read()
            .map_err(|_| poisoned())?
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    /// Make every subsequent `update_one` fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of read calls (`find_*`, `count`) served so far.
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn select(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
        limit: Option<usize>,
    ) -> Result<Vec<JsonValue>, StoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .filter(|doc| filter.matches(doc))
            .take(limit.unwrap_or(usize::MAX))
            .map(|doc| match projection {
                Some(p) => p.apply(doc),
                None => doc.clone(),
            })
            .collect())
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<JsonValue>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self
            .select(collection, filter, projection, Some(1))?
            .into_iter()
            .next())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
        limit: Option<usize>,
    ) -> Result<Vec<JsonValue>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.select(collection, filter, projection, limit)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let n = collections
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateAck, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("update rejected".to_string()));
        }

        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let target = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)));

        Ok(match target {
            Some(doc) => UpdateAck {
                matched: 1,
                modified: u64::from(update.apply(doc)),
            },
            None => UpdateAck::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprocessor_core::FieldPath;
    use serde_json::json;

    fn store() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for (id, status) in [("A", "FAILED"), ("B", "OK"), ("C", "FAILED")] {
            store
                .insert("things", json!({"w": {"id": id, "status": status}, "other": 1}))
                .unwrap();
        }
        store
    }

    fn failed() -> Filter {
        Filter::eq(FieldPath::new("w.status"), "FAILED")
    }

    #[tokio::test]
    async fn find_many_keeps_insertion_order_and_limit() {
        let store = store();
        let all = store.find_many("things", &failed(), None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["w"]["id"], json!("A"));

        let one = store.find_many("things", &failed(), None, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(store.count("things", &failed()).await.unwrap(), 2);
        assert_eq!(store.count("missing", &failed()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn projection_drops_other_fields() {
        let store = store();
        let projection = Projection::include([FieldPath::new("w")]);
        let doc = store
            .find_one("things", &failed(), Some(&projection))
            .await
            .unwrap()
            .unwrap();
        assert!(doc.get("other").is_none());
        assert_eq!(doc["w"]["id"], json!("A"));
    }

    #[tokio::test]
    async fn update_one_touches_first_match_only() {
        let store = store();
        let update = Update::new().set(FieldPath::new("w.status"), "DONE");
        let ack = store.update_one("things", &failed(), &update).await.unwrap();
        assert_eq!(ack, UpdateAck { matched: 1, modified: 1 });

        let docs = store.documents("things").unwrap();
        assert_eq!(docs[0]["w"]["status"], json!("DONE"));
        assert_eq!(docs[2]["w"]["status"], json!("FAILED"));
        assert_eq!(docs[0]["other"], json!(1));
    }

    #[tokio::test]
    async fn injected_update_failure() {
        let store = store();
        store.fail_updates(true);
        let update = Update::new().set(FieldPath::new("w.status"), "DONE");
        assert!(matches!(
            store.update_one("things", &failed(), &update).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.update_calls(), 1);
    }
}
