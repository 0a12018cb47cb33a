//! Retry policy: retry-or-give-up decision for a failed record.
//!
//! Every reprocessing attempt bumps the retry counter. While the bumped count
//! stays within the configured limit the record moves to `RETRY` and is
//! republished; past the limit it moves to `GIVEN-UP` and is not published.
//! The limit is whatever the configuration says at evaluation time, so raising
//! it lets later passes retry records that earlier passes would have given up.

use serde::{Deserialize, Serialize};

use crate::schema::FailedRecord;
use crate::status::SyncStatus;

/// Outcome of evaluating one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryDecision {
    pub next_status: SyncStatus,
    pub next_retry_count: u32,
    pub should_publish: bool,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of reprocessing attempts before giving up.
    pub retry_limit: u32,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32) -> Self {
        Self { retry_limit }
    }

    /// Decide from a raw retry count.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        let next_retry_count = retry_count.saturating_add(1);

        if self.retry_limit < next_retry_count {
            RetryDecision {
                next_status: SyncStatus::GivenUp,
                next_retry_count,
                should_publish: false,
            }
        } else {
            RetryDecision {
                next_status: SyncStatus::Retry,
                next_retry_count,
                should_publish: true,
            }
        }
    }

    pub fn evaluate<R: FailedRecord + ?Sized>(&self, record: &R) -> RetryDecision {
        self.decide(record.retry_count())
    }
}

/// Evaluate `record` against `retry_limit`.
pub fn evaluate<R: FailedRecord + ?Sized>(record: &R, retry_limit: u32) -> RetryDecision {
    RetryPolicy::new(retry_limit).evaluate(record)
}
