//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures (malformed selection input,
/// unsupported attributes, broken documents). Infrastructure concerns belong
/// in the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. an unparseable date).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A stored document does not have the shape the domain schema expects.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }
}
