use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use reprocessor_core::message::{MessageContext, OutboundMessage};
use reprocessor_core::schema::{Attribute, DomainSchema, FailedRecord};
use reprocessor_core::time::timestamp_from_json;
use reprocessor_core::{DomainError, DomainResult, RetryDecision, SyncStatus};

/// Queue group shared by every business-partner message.
pub const BUSINESS_PARTNER_GROUP: &str = "som-business-partner";

/// Business partner sync status as persisted by the ingestion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusinessPartnerSyncStatus {
    #[serde(rename = "BP-CREATE-FAILED")]
    CreateFailed,
    #[serde(rename = "BP-RETRY")]
    Retry,
    #[serde(rename = "ECC-BP-RETRY")]
    GivenUp,
}

impl BusinessPartnerSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessPartnerSyncStatus::CreateFailed => "BP-CREATE-FAILED",
            BusinessPartnerSyncStatus::Retry => "BP-RETRY",
            BusinessPartnerSyncStatus::GivenUp => "ECC-BP-RETRY",
        }
    }
}

impl From<SyncStatus> for BusinessPartnerSyncStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::CreateFailed => BusinessPartnerSyncStatus::CreateFailed,
            SyncStatus::Retry => BusinessPartnerSyncStatus::Retry,
            SyncStatus::GivenUp => BusinessPartnerSyncStatus::GivenUp,
        }
    }
}

impl From<BusinessPartnerSyncStatus> for SyncStatus {
    fn from(status: BusinessPartnerSyncStatus) -> Self {
        match status {
            BusinessPartnerSyncStatus::CreateFailed => SyncStatus::CreateFailed,
            BusinessPartnerSyncStatus::Retry => SyncStatus::Retry,
            BusinessPartnerSyncStatus::GivenUp => SyncStatus::GivenUp,
        }
    }
}

/// Stored customer document (collection `customers`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPartnerDocument {
    pub wrapped_business_partner: WrappedBusinessPartner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedBusinessPartner {
    pub envelope: Envelope,
    /// Business payload; carried through to the queue untouched.
    #[serde(default)]
    pub business_partner: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub business_partner_envelope: BusinessPartnerEnvelope,
}

/// Envelope fields used for selection and retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPartnerEnvelope {
    pub business_partner_id: String,
    #[serde(default)]
    pub idoc_number: Option<String>,
    pub business_partner_sync_status: BusinessPartnerSyncStatus,
    #[serde(default)]
    pub retry_count: Option<u32>,
    #[serde(default)]
    pub fail_count: Option<u32>,
    /// Kept raw: upstream writes ISO strings or extended-JSON dates.
    #[serde(default)]
    pub last_failed_attempt_time_date: Option<JsonValue>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub customer_number: Option<String>,
    #[serde(default)]
    pub time_of_creation: Option<JsonValue>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl BusinessPartnerDocument {
    pub fn envelope(&self) -> &BusinessPartnerEnvelope {
        &self.wrapped_business_partner.envelope.business_partner_envelope
    }

    /// Queue de-duplication key: `businessPartnerId-idocNumber`.
    pub fn dedup_key(&self) -> String {
        let env = self.envelope();
        match env.idoc_number.as_deref() {
            Some(idoc) => format!("{}-{}", env.business_partner_id, idoc),
            None => env.business_partner_id.clone(),
        }
    }
}

impl FailedRecord for BusinessPartnerDocument {
    fn record_id(&self) -> &str {
        &self.envelope().business_partner_id
    }

    fn idoc_number(&self) -> Option<&str> {
        self.envelope().idoc_number.as_deref()
    }

    fn sync_status(&self) -> SyncStatus {
        self.envelope().business_partner_sync_status.into()
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

/// Body of the message republished for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPartnerMessage {
    pub business_partner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idoc_number: Option<String>,
    pub business_partner_sync_status: BusinessPartnerSyncStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_number: Option<String>,
    pub business_partner: JsonValue,
}

/// Customer reprocessing domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerSchema;

impl DomainSchema for CustomerSchema {
    type Record = BusinessPartnerDocument;

    const NAME: &'static str = "customers";
    const LABEL: &'static str = "Customer";
    const COLLECTION: &'static str = "customers";
    const WRAPPER: &'static str = "wrappedBusinessPartner";
    const ENVELOPE: &'static str = "wrappedBusinessPartner.envelope.businessPartnerEnvelope";
    const ID_FIELD: &'static str = "businessPartnerId";
    const STATUS_FIELD: &'static str = "businessPartnerSyncStatus";

    fn status_value(status: SyncStatus) -> &'static str {
        BusinessPartnerSyncStatus::from(status).as_str()
    }

    fn attribute_field(attribute: Attribute) -> Option<&'static str> {
        match attribute {
            Attribute::RecordId => Some("businessPartnerId"),
            Attribute::CustomerNumber => Some("customerNumber"),
            Attribute::PoNumber => None,
            Attribute::CreationTime => Some("timeOfCreation"),
        }
    }

    fn outbound_message(
        record: &Self::Record,
        decision: &RetryDecision,
        ctx: &MessageContext<'_>,
    ) -> DomainResult<OutboundMessage> {
        let env = record.envelope();
        let body = BusinessPartnerMessage {
            business_partner_id: env.business_partner_id.clone(),
            idoc_number: env.idoc_number.clone(),
            business_partner_sync_status: decision.next_status.into(),
            retry_count: decision.next_retry_count,
            customer_number: env.customer_number.clone(),
            business_partner: record.wrapped_business_partner.business_partner.clone(),
        };

        let msg = OutboundMessage::json(&body)
            .map_err(|e| DomainError::malformed(format!("customer message: {e}")))?;

        Ok(msg
            .with_dedup_key(record.dedup_key())
            .with_group_key(BUSINESS_PARTNER_GROUP)
            .with_trace_attributes(ctx, env.correlation_id.as_deref(), env.idoc_number.as_deref()))
    }
}
