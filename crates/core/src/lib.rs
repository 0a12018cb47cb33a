//! `reprocessor-core`: domain foundation for failed-record reprocessing.
//!
//! This crate contains **pure domain** logic (no infrastructure concerns):
//! the retry policy, the query builder that turns selection parameters into
//! store filters, and the [`DomainSchema`] seam that the customer and order
//! crates implement.

pub mod error;
pub mod filter;
pub mod id;
pub mod message;
pub mod policy;
pub mod query;
pub mod schema;
pub mod selection;
pub mod status;
pub mod time;

pub use error::{DomainError, DomainResult};
pub use filter::{FieldPath, Filter, Projection, TimeRange, Update};
pub use id::{RecordId, RunId};
pub use message::{MessageContext, OutboundMessage};
pub use policy::{RetryDecision, RetryPolicy};
pub use query::{AttributeParams, QueryBuilder};
pub use schema::{Attribute, DomainSchema, FailedRecord};
pub use selection::{Selection, SelectionParams};
pub use status::SyncStatus;
