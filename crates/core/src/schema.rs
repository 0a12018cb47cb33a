//! Domain schema: what differs between the customer and order subsystems.
//!
//! The query builder and the orchestrator are written once against
//! [`DomainSchema`]. A domain crate supplies its collection name, the dotted
//! location of its envelope, its persisted status literals, and a typed record
//! that implements [`FailedRecord`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::filter::{FieldPath, Projection};
use crate::message::{MessageContext, OutboundMessage};
use crate::policy::RetryDecision;
use crate::status::SyncStatus;

/// Envelope field names common to both domains.
pub mod fields {
    pub const IDOC_NUMBER: &str = "idocNumber";
    pub const RETRY_COUNT: &str = "retryCount";
    pub const FAIL_COUNT: &str = "failCount";
    pub const LAST_FAILED_AT: &str = "lastFailedAttemptTimeDate";
    pub const ERROR_CODE: &str = "errorCode";
    pub const CUSTOMER_NUMBER: &str = "customerNumber";
    pub const CORRELATION_ID: &str = "correlationId";
}

/// Single-attribute selectors, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    RecordId,
    CustomerNumber,
    PoNumber,
    CreationTime,
}

impl Attribute {
    /// Highest priority first.
    pub const PRIORITY: [Attribute; 4] = [
        Attribute::RecordId,
        Attribute::CustomerNumber,
        Attribute::PoNumber,
        Attribute::CreationTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::RecordId => "id",
            Attribute::CustomerNumber => "customerNumber",
            Attribute::PoNumber => "poNumber",
            Attribute::CreationTime => "creationTime",
        }
    }
}

/// Read access to the envelope of a failed record.
pub trait FailedRecord {
    fn record_id(&self) -> &str;
    fn idoc_number(&self) -> Option<&str>;
    fn sync_status(&self) -> SyncStatus;
    fn retry_count(&self) -> u32;
    fn fail_count(&self) -> u32;
    fn last_failed_at(&self) -> Option<DateTime<Utc>>;
    fn error_code(&self) -> Option<&str>;
}

/// Static description of one reprocessing domain.
pub trait DomainSchema: Send + Sync + 'static {
    /// Typed form of a stored document.
    type Record: FailedRecord + DeserializeOwned + Send + Sync;

    /// Short plural name used in logs, config keys and messages (`customers`).
    const NAME: &'static str;
    /// Singular label for response messages (`Customer`).
    const LABEL: &'static str;
    /// Store collection holding the documents.
    const COLLECTION: &'static str;
    /// Top-level wrapper field; fetches project to it.
    const WRAPPER: &'static str;
    /// Dotted path of the envelope holding status and counters.
    const ENVELOPE: &'static str;
    /// Envelope field holding the record id.
    const ID_FIELD: &'static str;
    /// Envelope field holding the sync status.
    const STATUS_FIELD: &'static str;

    /// Persisted literal for `status`.
    fn status_value(status: SyncStatus) -> &'static str;

    /// Envelope field selected by `attribute`, if this domain has one.
    fn attribute_field(attribute: Attribute) -> Option<&'static str>;

    /// Queue message republishing `record` after `decision`.
    fn outbound_message(
        record: &Self::Record,
        decision: &RetryDecision,
        ctx: &MessageContext<'_>,
    ) -> DomainResult<OutboundMessage>;

    fn envelope_field(name: &str) -> FieldPath {
        FieldPath::nested(Self::ENVELOPE, name)
    }

    fn id_field() -> FieldPath {
        Self::envelope_field(Self::ID_FIELD)
    }

    fn status_field() -> FieldPath {
        Self::envelope_field(Self::STATUS_FIELD)
    }

    fn projection() -> Projection {
        Projection::include([FieldPath::new(Self::WRAPPER)])
    }

    /// Reverse of [`status_value`](Self::status_value).
    fn parse_status(value: &str) -> Option<SyncStatus> {
        SyncStatus::ALL
            .into_iter()
            .find(|s| Self::status_value(*s) == value)
    }

    /// Decode a stored document into the typed record.
    ///
    /// A record whose id is blank is malformed: it could never be updated
    /// by id.
    fn parse_record(doc: JsonValue) -> DomainResult<Self::Record> {
        let record: Self::Record = serde_json::from_value(doc)
            .map_err(|e| DomainError::malformed(format!("{} document: {e}", Self::NAME)))?;
        if record.record_id().trim().is_empty() {
            return Err(DomainError::malformed(format!(
                "{} document has a blank {}",
                Self::NAME,
                Self::ID_FIELD
            )));
        }
        Ok(record)
    }
}
