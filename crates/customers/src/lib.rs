//! Customer (business partner) reprocessing domain.
//!
//! Typed view of the documents the ingestion service stores in `customers`,
//! plus the [`CustomerSchema`] that plugs them into the generic query builder
//! and orchestrator. Pure: no IO.

pub mod business_partner;

pub use business_partner::{
    BusinessPartnerDocument, BusinessPartnerEnvelope, BusinessPartnerMessage,
    BusinessPartnerSyncStatus, CustomerSchema, Envelope, WrappedBusinessPartner,
    BUSINESS_PARTNER_GROUP,
};
