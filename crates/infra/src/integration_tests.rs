//! Integration tests for the full reprocessing pipeline.
//!
//! Tests: Selection → DocumentStore → RetryPolicy → status update → MessageQueue
//!
//! Verifies:
//! - Retried records are updated and republished, given-up records only updated
//! - Only `CREATE-FAILED` records are ever selected
//! - Batch failures are isolated per record; store failures abort

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    use serde_json::{Value as JsonValue, json};

    use reprocessor_core::message::{ATTR_SERVICE_MONIKER, ATTR_SPAN_ID, ATTR_TRACE_ID};
    use reprocessor_core::{Filter, Projection, RecordId, SelectionParams, Update};
    use reprocessor_customers::CustomerSchema;
    use reprocessor_orders::OrderSchema;

    use crate::config::{EnvConfig, ReprocessConfig, StaticConfig};
    use crate::document_store::{DocumentStore, InMemoryDocumentStore, StoreError, UpdateAck};
    use crate::queue::InMemoryQueue;
    use crate::reprocessor::{ReprocessError, ReprocessStatus, Reprocessor};

    const CUSTOMERS_Q: &str = "customers-q";
    const ORDERS_Q: &str = "orders-q";

    type Customers = Reprocessor<CustomerSchema, Arc<InMemoryDocumentStore>, Arc<InMemoryQueue>, StaticConfig>;
    type Orders = Reprocessor<OrderSchema, Arc<InMemoryDocumentStore>, Arc<InMemoryQueue>, StaticConfig>;

    fn customer(id: &str, status: &str, retry_count: u32) -> JsonValue {
        json!({
            "_id": format!("oid-{id}"),
            "wrappedBusinessPartner": {
                "envelope": {
                    "businessPartnerEnvelope": {
                        "businessPartnerId": id,
                        "idocNumber": format!("IDOC-{id}"),
                        "businessPartnerSyncStatus": status,
                        "retryCount": retry_count,
                        "failCount": 1,
                        "lastFailedAttemptTimeDate": "2024-03-02T10:00:00Z",
                        "errorCode": "E-TIMEOUT",
                        "customerNumber": format!("CUST-{id}"),
                        "correlationId": format!("corr-{id}")
                    }
                },
                "businessPartner": { "name": id }
            }
        })
    }

    fn order(id: &str, retry_count: u32, failed_at: &str, error_code: &str) -> JsonValue {
        json!({
            "wrappedSkuOrder": {
                "envelope": {
                    "skuOrderEnvelope": {
                        "orderId": id,
                        "idocNumber": format!("IDOC-{id}"),
                        "orderSyncStatus": "SOM-ORD-CREATE-FAILED",
                        "retryCount": retry_count,
                        "lastFailedAttemptTimeDate": failed_at,
                        "errorCode": error_code,
                        "customerNumber": "CUST-1",
                        "poNumber": format!("PO-{id}"),
                        "orderType": "ZOR"
                    }
                },
                "skuOrder": {
                    "ZORDERS05": { "IDOC": { "E1EDK01": { "ZE1EDK02A": [ { "ZINDICATOR": "Z1" } ] } } }
                }
            }
        })
    }

    fn config(retry_limit: u32) -> StaticConfig {
        StaticConfig::new(ReprocessConfig::new(retry_limit, "unused"))
            .with_domain("customers", ReprocessConfig::new(retry_limit, CUSTOMERS_Q))
            .with_domain("orders", ReprocessConfig::new(retry_limit, ORDERS_Q))
    }

    fn setup() -> (Arc<InMemoryDocumentStore>, Arc<InMemoryQueue>) {
        (Arc::new(InMemoryDocumentStore::new()), Arc::new(InMemoryQueue::new()))
    }

    fn customers(store: &Arc<InMemoryDocumentStore>, queue: &Arc<InMemoryQueue>, cfg: StaticConfig) -> Customers {
        Reprocessor::new(store.clone(), queue.clone(), cfg)
    }

    fn orders(store: &Arc<InMemoryDocumentStore>, queue: &Arc<InMemoryQueue>, cfg: StaticConfig) -> Orders {
        Reprocessor::new(store.clone(), queue.clone(), cfg)
    }

    fn customer_envelope(store: &InMemoryDocumentStore, index: usize) -> JsonValue {
        store.documents("customers").unwrap()[index]["wrappedBusinessPartner"]["envelope"]
            ["businessPartnerEnvelope"]
            .clone()
    }

    fn order_envelope(store: &InMemoryDocumentStore, index: usize) -> JsonValue {
        store.documents("som-orders").unwrap()[index]["wrappedSkuOrder"]["envelope"]["skuOrderEnvelope"].clone()
    }

    /// Reads go to the inner store; updates match nothing, as when another
    /// writer changed the record between fetch and update.
    struct LostUpdates(Arc<InMemoryDocumentStore>);

    #[async_trait::async_trait]
    impl DocumentStore for LostUpdates {
        async fn find_one(
            &self,
            collection: &str,
            filter: &Filter,
            projection: Option<&Projection>,
        ) -> Result<Option<JsonValue>, StoreError> {
            self.0.find_one(collection, filter, projection).await
        }

        async fn find_many(
            &self,
            collection: &str,
            filter: &Filter,
            projection: Option<&Projection>,
            limit: Option<usize>,
        ) -> Result<Vec<JsonValue>, StoreError> {
            self.0.find_many(collection, filter, projection, limit).await
        }

        async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
            self.0.count(collection, filter).await
        }

        async fn update_one(&self, _: &str, _: &Filter, _: &Update) -> Result<UpdateAck, StoreError> {
            Ok(UpdateAck::default())
        }
    }

    fn id(value: &str) -> RecordId {
        RecordId::new(value).unwrap()
    }

    #[tokio::test]
    async fn single_within_limit_is_retried_and_published() {
        let (store, queue) = setup();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 2)).unwrap();

        let summary = customers(&store, &queue, config(3))
            .reprocess_single(&id("C1"))
            .await
            .unwrap();

        assert_eq!(summary.status, ReprocessStatus::Success);
        assert_eq!(summary.reprocess_count, 1);
        assert_eq!(summary.record_id, "C1");

        let env = customer_envelope(&store, 0);
        assert_eq!(env["businessPartnerSyncStatus"], json!("BP-RETRY"));
        assert_eq!(env["retryCount"], json!(3));
        assert_eq!(env["customerNumber"], json!("CUST-C1"));

        let messages = queue.messages(CUSTOMERS_Q);
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.dedup_key.as_deref(), Some("C1-IDOC-C1"));
        assert_eq!(msg.attributes.get(ATTR_SPAN_ID).map(String::as_str), Some("corr-C1"));
        assert_eq!(msg.attributes.get(ATTR_TRACE_ID).map(String::as_str), Some("IDOC-C1"));
        assert_eq!(msg.attributes.get(ATTR_SERVICE_MONIKER).map(String::as_str), Some("reprocessor"));
    }

    #[tokio::test]
    async fn single_past_limit_is_given_up_without_publish() {
        let (store, queue) = setup();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 3)).unwrap();

        let summary = customers(&store, &queue, config(3))
            .reprocess_single(&id("C1"))
            .await
            .unwrap();

        assert_eq!(summary.status, ReprocessStatus::Success);
        let env = customer_envelope(&store, 0);
        assert_eq!(env["businessPartnerSyncStatus"], json!("ECC-BP-RETRY"));
        assert_eq!(env["retryCount"], json!(4));
        assert_eq!(queue.published_count(), 0);
    }

    #[tokio::test]
    async fn single_missing_or_not_failed_is_no_content() {
        let (store, queue) = setup();
        store.insert("customers", customer("C2", "BP-RETRY", 0)).unwrap();
        let reprocessor = customers(&store, &queue, config(3));

        for record in ["C404", "C2"] {
            let summary = reprocessor.reprocess_single(&id(record)).await.unwrap();
            assert_eq!(summary.status, ReprocessStatus::NoContent);
            assert_eq!(summary.reprocess_count, 0);
        }
        assert_eq!(store.update_calls(), 0);
        assert_eq!(queue.published_count(), 0);
    }

    #[tokio::test]
    async fn single_publish_failure_keeps_status_update() {
        let (store, queue) = setup();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 0)).unwrap();
        queue.set_offline(true);

        let err = customers(&store, &queue, config(3))
            .reprocess_single(&id("C1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReprocessError::Publish { ref record_id, .. } if record_id == "C1"));
        let env = customer_envelope(&store, 0);
        assert_eq!(env["businessPartnerSyncStatus"], json!("BP-RETRY"));
        assert_eq!(env["retryCount"], json!(1));
    }

    #[tokio::test]
    async fn batch_of_three_with_one_given_up() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O2", 2, "2024-03-02T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O3", 3, "2024-03-03T00:00:00Z", "E2")).unwrap();

        let summary = orders(&store, &queue, config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();

        assert_eq!(summary.status, ReprocessStatus::Success);
        assert_eq!(summary.reprocess_count, 3);
        assert_eq!(summary.ids, vec!["O1", "O2", "O3"]);
        assert_eq!(summary.published_count, 2);
        assert_eq!(summary.given_up_ids, vec!["O3"]);
        assert!(summary.failures.is_empty());

        let messages = queue.messages(ORDERS_Q);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].dedup_key.as_deref(), Some("O1-Z1"));
        assert_eq!(messages[0].group_key.as_deref(), Some("som-order"));

        assert_eq!(order_envelope(&store, 0)["orderSyncStatus"], json!("SOM-ORD-RETRY"));
        assert_eq!(order_envelope(&store, 2)["orderSyncStatus"], json!("ECC-ORD-RETRY"));
        assert_eq!(order_envelope(&store, 2)["retryCount"], json!(4));
    }

    #[tokio::test]
    async fn empty_batch_is_no_content_without_writes() {
        let (store, queue) = setup();
        let summary = orders(&store, &queue, config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();

        assert_eq!(summary.status, ReprocessStatus::NoContent);
        assert_eq!(summary.reprocess_count, 0);
        assert!(summary.ids.is_empty());
        assert_eq!(store.update_calls(), 0);
        assert_eq!(queue.published_count(), 0);
    }

    #[tokio::test]
    async fn second_pass_finds_nothing() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        let reprocessor = orders(&store, &queue, config(3));

        reprocessor.reprocess_batch(&SelectionParams::default()).await.unwrap();
        let again = reprocessor.reprocess_batch(&SelectionParams::default()).await.unwrap();
        assert_eq!(again.status, ReprocessStatus::NoContent);
        assert_eq!(queue.published_count(), 1);
    }

    #[tokio::test]
    async fn batch_publish_failure_is_recorded_and_batch_continues() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O2", 0, "2024-03-02T00:00:00Z", "E1")).unwrap();
        queue.reject_dedup_key("O1-Z1");

        let summary = orders(&store, &queue, config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();

        assert_eq!(summary.reprocess_count, 2);
        assert_eq!(summary.published_count, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].record_id, "O1");
        assert_eq!(order_envelope(&store, 0)["orderSyncStatus"], json!("SOM-ORD-RETRY"));
    }

    #[tokio::test]
    async fn batch_store_failure_aborts() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.fail_updates(true);

        let err = orders(&store, &queue, config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReprocessError::Store(StoreError::Unavailable(_))));
        assert_eq!(queue.published_count(), 0);
    }

    #[tokio::test]
    async fn invalid_selection_fails_before_io() {
        let (store, queue) = setup();
        let params = SelectionParams {
            from_date: Some("yesterday".into()),
            ..Default::default()
        };

        let err = orders(&store, &queue, config(3)).reprocess_batch(&params).await.unwrap_err();
        assert!(matches!(err, ReprocessError::Domain(_)));
        assert_eq!(store.read_calls(), 0);
    }

    #[tokio::test]
    async fn batch_limit_and_hard_cap() {
        let (store, queue) = setup();
        for n in 0..5 {
            store
                .insert("som-orders", order(&format!("O{n}"), 0, "2024-03-01T00:00:00Z", "E1"))
                .unwrap();
        }

        let limited = SelectionParams {
            limit: Some(2),
            ..Default::default()
        };
        let summary = orders(&store, &queue, config(3)).reprocess_batch(&limited).await.unwrap();
        assert_eq!(summary.ids, vec!["O0", "O1"]);

        let capped = StaticConfig::new(
            ReprocessConfig::new(3, ORDERS_Q)
                .with_batch_limit(50)
                .with_batch_hard_cap(1),
        );
        let summary = orders(&store, &queue, capped)
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();
        assert_eq!(summary.ids, vec!["O2"]);
    }

    #[tokio::test]
    async fn selection_by_error_code_and_date_range() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O2", 0, "2024-03-05T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O3", 0, "2024-03-05T00:00:00Z", "E2")).unwrap();
        let reprocessor = orders(&store, &queue, config(3));

        let by_code = SelectionParams {
            error_code: Some("E1".into()),
            from_date: Some("2024-03-02".into()),
            ..Default::default()
        };
        let summary = reprocessor.reprocess_batch(&by_code).await.unwrap();
        assert_eq!(summary.ids, vec!["O2"]);

        let by_range = SelectionParams {
            last_failed_range: Some("..2024-03-02".into()),
            ..Default::default()
        };
        let summary = reprocessor.reprocess_batch(&by_range).await.unwrap();
        assert_eq!(summary.ids, vec!["O1"]);
    }

    #[tokio::test]
    async fn selection_by_attribute_prefers_id() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O2", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();

        let params = SelectionParams {
            record_id: Some("O2".into()),
            po_number: Some("PO-O1".into()),
            ..Default::default()
        };
        let summary = orders(&store, &queue, config(3)).reprocess_batch(&params).await.unwrap();
        assert_eq!(summary.ids, vec!["O2"]);
    }

    #[tokio::test]
    async fn store_timeout_is_an_infrastructure_error() {
        let (store, queue) = setup();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 0)).unwrap();
        store.set_latency(Duration::from_millis(200));

        let cfg = StaticConfig::new(
            ReprocessConfig::new(3, CUSTOMERS_Q).with_io_timeout(Duration::from_millis(10)),
        );
        let err = customers(&store, &queue, cfg)
            .reprocess_single(&id("C1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReprocessError::Store(StoreError::Timeout { operation: "find_one", .. })
        ));
    }

    #[tokio::test]
    async fn raised_limit_applies_to_next_pass() {
        let (store, queue) = setup();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 3)).unwrap();
        store.insert("customers", customer("C2", "BP-CREATE-FAILED", 3)).unwrap();

        let limit = Arc::new(RwLock::new("3".to_string()));
        let shared = limit.clone();
        let env = EnvConfig::from_lookup(move |key| match key {
            "REPROCESS_RETRY_LIMIT" => shared.read().ok().map(|v| v.clone()),
            "CUSTOMERS_QUEUE_URL" => Some(CUSTOMERS_Q.to_string()),
            _ => None,
        });
        let reprocessor = Reprocessor::<CustomerSchema, _, _, _>::new(store.clone(), queue.clone(), env);

        reprocessor.reprocess_single(&id("C1")).await.unwrap();
        assert_eq!(queue.published_count(), 0);

        *limit.write().unwrap() = "10".to_string();
        reprocessor.reprocess_single(&id("C2")).await.unwrap();
        assert_eq!(queue.published_count(), 1);
        assert_eq!(customer_envelope(&store, 1)["businessPartnerSyncStatus"], json!("BP-RETRY"));
    }

    #[tokio::test]
    async fn bad_record_in_batch_does_not_abort_it() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("   ", 0, "2024-03-02T00:00:00Z", "E1")).unwrap();
        store.insert("som-orders", order("O3", 0, "2024-03-03T00:00:00Z", "E1")).unwrap();

        let summary = orders(&store, &queue, config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();

        assert_eq!(summary.status, ReprocessStatus::Success);
        assert_eq!(summary.ids, vec!["O1", "O3"]);
        assert_eq!(summary.reprocess_count, 2);
        assert_eq!(summary.published_count, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].record_id, "   ");
        assert_eq!(order_envelope(&store, 2)["orderSyncStatus"], json!("SOM-ORD-RETRY"));
        assert_eq!(order_envelope(&store, 1)["orderSyncStatus"], json!("SOM-ORD-CREATE-FAILED"));
    }

    #[tokio::test]
    async fn padded_stored_id_is_updated_and_counts_toward_limit() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O2 ", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        let reprocessor = orders(&store, &queue, config(1));

        let first = reprocessor.reprocess_batch(&SelectionParams::default()).await.unwrap();
        assert_eq!(first.published_count, 1);
        assert_eq!(first.ids, vec!["O2 "]);
        let env = order_envelope(&store, 0);
        assert_eq!(env["orderSyncStatus"], json!("SOM-ORD-RETRY"));
        assert_eq!(env["retryCount"], json!(1));

        for _ in 0..2 {
            let again = reprocessor.reprocess_batch(&SelectionParams::default()).await.unwrap();
            assert_eq!(again.status, ReprocessStatus::NoContent);
        }
        assert_eq!(queue.published_count(), 1);
    }

    #[tokio::test]
    async fn unmatched_update_is_not_published() {
        let (store, queue) = setup();
        store.insert("som-orders", order("O1", 0, "2024-03-01T00:00:00Z", "E1")).unwrap();
        store.insert("customers", customer("C1", "BP-CREATE-FAILED", 0)).unwrap();

        let summary = Reprocessor::<OrderSchema, _, _, _>::new(LostUpdates(store.clone()), queue.clone(), config(3))
            .reprocess_batch(&SelectionParams::default())
            .await
            .unwrap();
        assert_eq!(summary.reprocess_count, 0);
        assert_eq!(summary.published_count, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].record_id, "O1");

        let err = Reprocessor::<CustomerSchema, _, _, _>::new(LostUpdates(store.clone()), queue.clone(), config(3))
            .reprocess_single(&id("C1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReprocessError::NotUpdated { ref record_id } if record_id == "C1"));
        assert_eq!(queue.published_count(), 0);
    }
}
