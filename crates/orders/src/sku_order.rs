use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use reprocessor_core::message::{MessageContext, OutboundMessage};
use reprocessor_core::schema::{Attribute, DomainSchema, FailedRecord};
use reprocessor_core::time::timestamp_from_json;
use reprocessor_core::{DomainError, DomainResult, FieldPath, RetryDecision, SyncStatus};

/// Queue group shared by every order message.
pub const SKU_ORDER_GROUP: &str = "som-order";

/// Location of the partner segments inside the IDoc payload.
const ZINDICATOR_SEGMENTS: &str = "ZORDERS05.IDOC.E1EDK01.ZE1EDK02A";

/// Order sync status as persisted by the ingestion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSyncStatus {
    #[serde(rename = "SOM-ORD-CREATE-FAILED")]
    CreateFailed,
    #[serde(rename = "SOM-ORD-RETRY")]
    Retry,
    #[serde(rename = "ECC-ORD-RETRY")]
    GivenUp,
}

impl OrderSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSyncStatus::CreateFailed => "SOM-ORD-CREATE-FAILED",
            OrderSyncStatus::Retry => "SOM-ORD-RETRY",
            OrderSyncStatus::GivenUp => "ECC-ORD-RETRY",
        }
    }
}

impl From<SyncStatus> for OrderSyncStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::CreateFailed => OrderSyncStatus::CreateFailed,
            SyncStatus::Retry => OrderSyncStatus::Retry,
            SyncStatus::GivenUp => OrderSyncStatus::GivenUp,
        }
    }
}

impl From<OrderSyncStatus> for SyncStatus {
    fn from(status: OrderSyncStatus) -> Self {
        match status {
            OrderSyncStatus::CreateFailed => SyncStatus::CreateFailed,
            OrderSyncStatus::Retry => SyncStatus::Retry,
            OrderSyncStatus::GivenUp => SyncStatus::GivenUp,
        }
    }
}

/// Stored order document (collection `som-orders`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuOrderDocument {
    pub wrapped_sku_order: WrappedSkuOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedSkuOrder {
    pub envelope: Envelope,
    /// IDoc payload; only the ZINDICATOR segments are read.
    #[serde(default)]
    pub sku_order: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub sku_order_envelope: SkuOrderEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuOrderEnvelope {
    pub order_id: String,
    #[serde(default)]
    pub idoc_number: Option<String>,
    pub order_sync_status: OrderSyncStatus,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub fail_count: Option<u32>,
    #[serde(default)]
    pub last_failed_attempt_time_date: Option<JsonValue>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub customer_number: Option<String>,
    #[serde(default)]
    pub po_number: Option<String>,
    #[serde(default)]
    pub time_of_order_creation: Option<JsonValue>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SkuOrderDocument {
    pub fn envelope(&self) -> &SkuOrderEnvelope {
        &self.wrapped_sku_order.envelope.sku_order_envelope
    }

    /// First non-empty `ZINDICATOR` among the partner segments.
    ///
    /// The segment list may be serialized as a single object when the IDoc
    /// has one entry.
    pub fn zindicator(&self) -> Option<&str> {
        let segments = FieldPath::new(ZINDICATOR_SEGMENTS).lookup(&self.wrapped_sku_order.sku_order)?;
        match segments {
            JsonValue::Array(items) => items.iter().find_map(segment_indicator),
            other => segment_indicator(other),
        }
    }

    /// Queue de-duplication key: `orderId-zindicator`, or `orderId`.
    pub fn dedup_key(&self) -> String {
        let order_id = &self.envelope().order_id;
        match self.zindicator() {
            Some(z) => format!("{order_id}-{z}"),
            None => order_id.clone(),
        }
    }
}

fn segment_indicator(segment: &JsonValue) -> Option<&str> {
    segment
        .get("ZINDICATOR")
        .and_then(JsonValue::as_str)
        .filter(|z| !z.is_empty())
}

impl FailedRecord for SkuOrderDocument {
    fn record_id(&self) -> &str {
        &self.envelope().order_id
    }

    fn idoc_number(&self) -> Option<&str> {
        self.envelope().idoc_number.as_deref()
    }

    fn sync_status(&self) -> SyncStatus {
        self.envelope().order_sync_status.into()
    }

    fn retry_count(&self) -> u32 {
        self.envelope().retry_count.unwrap_or(0)
    }

    fn fail_count(&self) -> u32 {
        self.envelope().fail_count.unwrap_or(0)
    }

    fn last_failed_at(&self) -> Option<DateTime<Utc>> {
        self.envelope()
            .last_failed_attempt_time_date
            .as_ref()
            .and_then(timestamp_from_json)
    }

    fn error_code(&self) -> Option<&str> {
        self.envelope().error_code.as_deref()
    }
}

/// Body of the message republished for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuOrderMessage {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idoc_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    pub order_sync_status: OrderSyncStatus,
    pub retry_count: u32,
    pub sku_order: JsonValue,
}

/// Order reprocessing domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderSchema;

impl DomainSchema for OrderSchema {
    type Record = SkuOrderDocument;

    const NAME: &'static str = "orders";
    const LABEL: &'static str = "Order";
    const COLLECTION: &'static str = "som-orders";
    const WRAPPER: &'static str = "wrappedSkuOrder";
    const ENVELOPE: &'static str = "wrappedSkuOrder.envelope.skuOrderEnvelope";
    const ID_FIELD: &'static str = "orderId";
    const STATUS_FIELD: &'static str = "orderSyncStatus";

    fn status_value(status: SyncStatus) -> &'static str {
        OrderSyncStatus::from(status).as_str()
    }

    fn attribute_field(attribute: Attribute) -> Option<&'static str> {
        Some(match attribute {
            Attribute::RecordId => "orderId",
            Attribute::CustomerNumber => "customerNumber",
            Attribute::PoNumber => "poNumber",
            Attribute::CreationTime => "timeOfOrderCreation",
        })
    }

    fn outbound_message(
        record: &Self::Record,
        decision: &RetryDecision,
        ctx: &MessageContext<'_>,
    ) -> DomainResult<OutboundMessage> {
        let env = record.envelope();
        let body = SkuOrderMessage {
            order_id: env.order_id.clone(),
            idoc_number: env.idoc_number.clone(),
            order_type: env.order_type.clone(),
            order_sync_status: decision.next_status.into(),
            retry_count: decision.next_retry_count,
            sku_order: record.wrapped_sku_order.sku_order.clone(),
        };

        let msg = OutboundMessage::json(&body)
            .map_err(|e| DomainError::malformed(format!("order message: {e}")))?;

        Ok(msg
            .with_dedup_key(record.dedup_key())
            .with_group_key(SKU_ORDER_GROUP)
            .with_trace_attributes(ctx, env.correlation_id.as_deref(), env.idoc_number.as_deref()))
    }
}
