//! Reprocessing orchestrator.
//!
//! One pass is: fetch failed records, evaluate each with the retry policy,
//! persist the new status and retry count, then republish the records that
//! are retried. Records are handled strictly one after another in store
//! order. A record is only published once its status update matched a
//! document. The status update and the publish are not atomic: a publish
//! failure leaves the record updated (at-least-once, no rollback).

use core::marker::PhantomData;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, debug, error, info, instrument, warn};

use reprocessor_core::{
    DomainError, DomainSchema, FailedRecord, Filter, MessageContext, QueryBuilder, RecordId,
    RetryDecision, RetryPolicy, RunId, SelectionParams, SyncStatus,
};

use crate::config::{ConfigError, ConfigSource, ReprocessConfig};
use crate::document_store::{self, DocumentStore, StoreError};
use crate::queue::{self, MessageQueue, QueueError};

#[derive(Debug, Error)]
pub enum ReprocessError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The status update matched no stored document; nothing was published.
    #[error("status update for record {record_id:?} matched no document")]
    NotUpdated { record_id: String },

    #[error("publish failed for record {record_id}: {source}")]
    Publish {
        record_id: String,
        #[source]
        source: QueueError,
    },
}

/// Whether a pass found anything to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReprocessStatus {
    Success,
    NoContent,
}

/// Result of reprocessing one record by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSummary {
    pub record_id: String,
    pub reprocess_count: usize,
    pub status: ReprocessStatus,
    pub message: String,
}

/// A record skipped or left unpublished during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub record_id: String,
    pub reason: String,
}

/// Result of a batch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub ids: Vec<String>,
    /// Records attempted (retried and given up alike).
    pub reprocess_count: usize,
    pub status: ReprocessStatus,
    pub message: String,
    pub published_count: usize,
    pub given_up_ids: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

impl BatchSummary {
    fn empty<S: DomainSchema>() -> Self {
        Self {
            ids: Vec::new(),
            reprocess_count: 0,
            status: ReprocessStatus::NoContent,
            message: format!("No failed {} to re-process.", S::NAME),
            published_count: 0,
            given_up_ids: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// What happened to one record.
#[derive(Debug)]
struct RecordOutcome {
    record_id: String,
    decision: RetryDecision,
    /// `None` when the record was given up and nothing was published.
    publish: Option<Result<(), QueueError>>,
}

/// Generic reprocessor for domain `S`.
pub struct Reprocessor<S, D, Q, C> {
    store: D,
    queue: Q,
    config: C,
    _schema: PhantomData<fn() -> S>,
}

impl<S, D: Clone, Q: Clone, C: Clone> Clone for Reprocessor<S, D, Q, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            queue: self.queue.clone(),
            config: self.config.clone(),
            _schema: PhantomData,
        }
    }
}

impl<S, D, Q, C> Reprocessor<S, D, Q, C>
where
    S: DomainSchema,
    D: DocumentStore,
    Q: MessageQueue,
    C: ConfigSource,
{
    pub fn new(store: D, queue: Q, config: C) -> Self {
        Self {
            store,
            queue,
            config,
            _schema: PhantomData,
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Reprocess one failed record by id.
    ///
    /// A record that does not exist or is not `CREATE-FAILED` yields a
    /// `NoContent` summary. A publish failure is an error; the status update
    /// made just before it stays in place. An update that matches nothing is
    /// [`ReprocessError::NotUpdated`] and nothing is published.
    #[instrument(
        skip(self),
        fields(domain = S::NAME, record_id = %record_id, run_id = tracing::field::Empty),
        err
    )]
    pub async fn reprocess_single(&self, record_id: &RecordId) -> Result<SingleSummary, ReprocessError> {
        let config = self.config.load(S::NAME)?;
        let run_id = RunId::new();
        Span::current().record("run_id", tracing::field::display(run_id));
        info!(marker = "REPROCESS-START", "reprocess failed {} by id", S::LABEL);

        let filter = QueryBuilder::<S>::failed_record_by_id(record_id);
        let projection = S::projection();
        let doc = document_store::with_timeout(
            "find_one",
            config.io_timeout,
            self.store.find_one(S::COLLECTION, &filter, Some(&projection)),
        )
        .await?;

        let Some(doc) = doc else {
            info!(marker = "REPROCESS-END", "no failed {} found", S::LABEL);
            return Ok(SingleSummary {
                record_id: record_id.to_string(),
                reprocess_count: 0,
                status: ReprocessStatus::NoContent,
                message: format!("No failed {} {} to re-process.", S::LABEL, record_id),
            });
        };

        let record = S::parse_record(doc)?;
        let outcome = self.process_record(&config, run_id, &record).await?;

        if let Some(Err(source)) = outcome.publish {
            error!(error = %source, "publish failed after status update");
            return Err(ReprocessError::Publish {
                record_id: outcome.record_id,
                source,
            });
        }

        info!(
            marker = "REPROCESS-END",
            next_status = %outcome.decision.next_status,
            "re-processed failed {}", S::LABEL
        );
        Ok(SingleSummary {
            record_id: outcome.record_id,
            reprocess_count: 1,
            status: ReprocessStatus::Success,
            message: format!("Re-process failed {}", S::LABEL),
        })
    }

    /// Reprocess every failed record selected by `params`.
    ///
    /// Validation happens before any I/O. Per-record problems (malformed
    /// documents, message build errors, updates matching nothing, publish
    /// failures) are collected in the summary; a store failure aborts the pass.
    #[instrument(
        skip(self, params),
        fields(domain = S::NAME, run_id = tracing::field::Empty, limit = tracing::field::Empty),
        err
    )]
    pub async fn reprocess_batch(&self, params: &SelectionParams) -> Result<BatchSummary, ReprocessError> {
        let filter = params.to_filter::<S>()?;
        let config = self.config.load(S::NAME)?;
        let run_id = RunId::new();
        let span = Span::current();
        span.record("run_id", tracing::field::display(run_id));
        info!(marker = "REPROCESS-START", params = ?params, "reprocess all failed {}", S::NAME);

        let limit = self.batch_limit(&config, params, &filter).await?;
        span.record("limit", limit);
        if limit == 0 {
            info!(marker = "REPROCESS-END", "no failed {} to re-process", S::NAME);
            return Ok(BatchSummary::empty::<S>());
        }

        let projection = S::projection();
        let docs = document_store::with_timeout(
            "find_many",
            config.io_timeout,
            self.store
                .find_many(S::COLLECTION, &filter, Some(&projection), Some(limit as usize)),
        )
        .await?;

        if docs.is_empty() {
            info!(marker = "REPROCESS-END", "no failed {} to re-process", S::NAME);
            return Ok(BatchSummary::empty::<S>());
        }

        let mut summary = BatchSummary {
            ids: Vec::with_capacity(docs.len()),
            reprocess_count: 0,
            status: ReprocessStatus::Success,
            message: format!("Re-processing all failed {}.", S::NAME),
            published_count: 0,
            given_up_ids: Vec::new(),
            failures: Vec::new(),
        };

        for doc in docs {
            let raw_id = S::id_field()
                .lookup(&doc)
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>")
                .to_string();

            let record = match S::parse_record(doc) {
                Ok(record) => record,
                Err(e) => {
                    warn!(record_id = %raw_id, error = %e, "skipping malformed document");
                    summary.failures.push(RecordFailure {
                        record_id: raw_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let outcome = match self.process_record(&config, run_id, &record).await {
                Ok(outcome) => outcome,
                Err(e @ (ReprocessError::Domain(_) | ReprocessError::NotUpdated { .. })) => {
                    warn!(record_id = %raw_id, error = %e, "record skipped");
                    summary.failures.push(RecordFailure {
                        record_id: raw_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.reprocess_count += 1;
            summary.ids.push(outcome.record_id.clone());

            match outcome.publish {
                None => summary.given_up_ids.push(outcome.record_id),
                Some(Ok(())) => summary.published_count += 1,
                Some(Err(e)) => {
                    warn!(record_id = %outcome.record_id, error = %e, "publish failed; continuing batch");
                    summary.failures.push(RecordFailure {
                        record_id: outcome.record_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            marker = "REPROCESS-END",
            reprocess_count = summary.reprocess_count,
            published = summary.published_count,
            given_up = summary.given_up_ids.len(),
            failed = summary.failures.len(),
            "batch complete"
        );
        Ok(summary)
    }

    /// Request limit, else configured default, else everything matching;
    /// always bounded by the hard cap.
    async fn batch_limit(
        &self,
        config: &ReprocessConfig,
        params: &SelectionParams,
        filter: &Filter,
    ) -> Result<u32, ReprocessError> {
        let requested = match params.limit.or(config.batch_reprocess_limit) {
            Some(limit) => limit,
            None => {
                let n = document_store::with_timeout(
                    "count",
                    config.io_timeout,
                    self.store.count(S::COLLECTION, filter),
                )
                .await?;
                u32::try_from(n).unwrap_or(u32::MAX)
            }
        };
        Ok(requested.min(config.batch_hard_cap))
    }

    /// Evaluate, persist, and conditionally publish one record.
    ///
    /// The outbound message is built before the update, so a record whose
    /// message cannot be built is left untouched.
    #[instrument(
        skip(self, config, record),
        fields(record_id = %record.record_id(), retry_count = record.retry_count())
    )]
    async fn process_record(
        &self,
        config: &ReprocessConfig,
        run_id: RunId,
        record: &S::Record,
    ) -> Result<RecordOutcome, ReprocessError> {
        let decision = RetryPolicy::new(config.retry_limit).evaluate(record);
        let record_id = RecordId::new(record.record_id())?;

        let message = if decision.should_publish {
            let ctx = MessageContext {
                run_id,
                service_moniker: &config.service_moniker,
            };
            Some(S::outbound_message(record, &decision, &ctx)?)
        } else {
            None
        };

        let filter = match record.idoc_number() {
            Some(idoc) => QueryBuilder::<S>::filter_by_id_and_correlation(&record_id, idoc),
            None => QueryBuilder::<S>::filter_by_record_id(&record_id),
        };
        let update =
            QueryBuilder::<S>::build_status_update(decision.next_status, Some(decision.next_retry_count));

        let ack = document_store::with_timeout(
            "update_one",
            config.io_timeout,
            self.store.update_one(S::COLLECTION, &filter, &update),
        )
        .await?;
        if ack.matched == 0 {
            warn!("status update matched no document; not publishing");
            return Err(ReprocessError::NotUpdated {
                record_id: record_id.into_inner(),
            });
        }

        debug!(
            next_status = %decision.next_status,
            next_retry_count = decision.next_retry_count,
            "status updated"
        );

        let publish = match message {
            Some(message) => {
                info!(marker = "QUEUE-REQUEST", dedup_key = ?message.dedup_key, "publishing");
                let result = queue::with_timeout(
                    config.io_timeout,
                    self.queue.publish(&config.queue_target, &message),
                )
                .await
                .map(|ack| {
                    if ack.duplicate {
                        debug!(message_id = %ack.message_id, "queue reported duplicate");
                    }
                });
                Some(result)
            }
            None => {
                debug_assert_eq!(decision.next_status, SyncStatus::GivenUp);
                info!("retry limit exceeded; giving up");
                None
            }
        };

        Ok(RecordOutcome {
            record_id: record_id.into_inner(),
            decision,
            publish,
        })
    }
}
