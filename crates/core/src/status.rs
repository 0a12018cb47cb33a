//! Sync status lifecycle shared by every reprocessing domain.

use serde::{Deserialize, Serialize};

/// Reprocessing state of a failed record.
///
/// Each domain persists these under its own literal values (see
/// [`DomainSchema::status_value`](crate::schema::DomainSchema::status_value)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SyncStatus {
    /// Initial processing failed; selectable for reprocessing.
    CreateFailed,
    /// Re-queued, waiting for the downstream consumer.
    Retry,
    /// Retry budget exhausted. Terminal for this subsystem.
    GivenUp,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 3] = [SyncStatus::CreateFailed, SyncStatus::Retry, SyncStatus::GivenUp];
}

impl core::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SyncStatus::CreateFailed => "CREATE-FAILED",
            SyncStatus::Retry => "RETRY",
            SyncStatus::GivenUp => "GIVEN-UP",
        };
        f.write_str(s)
    }
}
