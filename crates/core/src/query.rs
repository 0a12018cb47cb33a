//! Query builder: selection parameters to store filters and updates.
//!
//! Pure and deterministic. Every selection filter is scoped to records that
//! are still `CREATE-FAILED`, so a reprocessing pass never touches records
//! that are already queued or given up.

use core::marker::PhantomData;

use crate::error::{DomainError, DomainResult};
use crate::filter::{Filter, TimeRange, Update};
use crate::id::RecordId;
use crate::schema::{fields, Attribute, DomainSchema};
use crate::status::SyncStatus;
use crate::time::parse_timestamp;

/// Single-attribute selectors. At most one is applied, see
/// [`QueryBuilder::filter_by_attributes`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeParams {
    pub record_id: Option<String>,
    pub customer_number: Option<String>,
    pub po_number: Option<String>,
    pub creation_time: Option<String>,
}

impl AttributeParams {
    /// First supplied attribute in priority order.
    pub fn first(&self) -> Option<(Attribute, &str)> {
        Attribute::PRIORITY
            .into_iter()
            .find_map(|attr| self.get(attr).map(|v| (attr, v)))
    }

    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        match attribute {
            Attribute::RecordId => self.record_id.as_deref(),
            Attribute::CustomerNumber => self.customer_number.as_deref(),
            Attribute::PoNumber => self.po_number.as_deref(),
            Attribute::CreationTime => self.creation_time.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }
}

/// Parse optional `from` / `to` strings into a half-open range.
pub fn parse_time_range(from: Option<&str>, to: Option<&str>) -> DomainResult<TimeRange> {
    let gte = from.map(parse_timestamp).transpose()?;
    let lt = to.map(parse_timestamp).transpose()?;

    if let (Some(f), Some(t)) = (gte, lt) {
        if f > t {
            return Err(DomainError::validation(format!(
                "date range start {f} is after end {t}"
            )));
        }
    }

    Ok(TimeRange { gte, lt })
}

/// Filter/update construction for domain `S`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder<S>(PhantomData<S>);

impl<S: DomainSchema> QueryBuilder<S> {
    /// Exact match on the current sync status.
    pub fn filter_by_sync_status(status: SyncStatus) -> Filter {
        Filter::eq(S::status_field(), S::status_value(status))
    }

    /// Records eligible for reprocessing.
    pub fn failed_records() -> Filter {
        Self::filter_by_sync_status(SyncStatus::CreateFailed)
    }

    pub fn filter_by_record_id(id: &RecordId) -> Filter {
        Filter::eq(S::id_field(), id.as_str())
    }

    /// Record id AND IDoc number: pins the exact document that was read.
    pub fn filter_by_id_and_correlation(id: &RecordId, idoc_number: &str) -> Filter {
        Filter::and([
            Self::filter_by_record_id(id),
            Filter::eq(S::envelope_field(fields::IDOC_NUMBER), idoc_number),
        ])
    }

    /// A failed record by id (single-record reprocessing).
    pub fn failed_record_by_id(id: &RecordId) -> Filter {
        Filter::and([Self::filter_by_record_id(id), Self::failed_records()])
    }

    /// Failed records whose last failure falls in `[from, to)`.
    ///
    /// Either bound may be omitted. With neither, this is just the status filter.
    pub fn filter_by_date_range(from: Option<&str>, to: Option<&str>) -> DomainResult<Filter> {
        Ok(Self::filter_by_time_range(parse_time_range(from, to)?))
    }

    pub fn filter_by_time_range(range: TimeRange) -> Filter {
        Self::scoped(Self::date_clause(range))
    }

    /// Failed records matching the highest-priority attribute supplied.
    ///
    /// Priority is id > customerNumber > poNumber > creationTime; lower
    /// priority attributes are ignored. Returns `None` when no attribute is set.
    pub fn filter_by_attributes(params: &AttributeParams) -> DomainResult<Option<Filter>> {
        params
            .first()
            .map(|(attribute, value)| Self::filter_by_attribute(attribute, value))
            .transpose()
    }

    /// Failed records whose `attribute` equals `value`.
    pub fn filter_by_attribute(attribute: Attribute, value: &str) -> DomainResult<Filter> {
        let field = S::attribute_field(attribute).ok_or_else(|| {
            DomainError::validation(format!(
                "{} cannot be filtered by {}",
                S::NAME,
                attribute.name()
            ))
        })?;

        Ok(Self::scoped(Some(Filter::eq(S::envelope_field(field), value))))
    }

    /// Failed records filtered by error code and/or last-failure date range.
    pub fn filter_by_error_code_and_date(
        error_code: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> DomainResult<Filter> {
        Ok(Self::filter_by_error_code_and_range(
            error_code,
            parse_time_range(from, to)?,
        ))
    }

    pub fn filter_by_error_code_and_range(error_code: Option<&str>, range: TimeRange) -> Filter {
        let mut clauses = Vec::new();
        if let Some(date) = Self::date_clause(range) {
            clauses.push(date);
        }
        if let Some(code) = error_code {
            clauses.push(Filter::eq(S::envelope_field(fields::ERROR_CODE), code));
        }
        clauses.push(Self::failed_records());
        Filter::and(clauses)
    }

    /// `$set` of the status, and of the retry count when given.
    pub fn build_status_update(status: SyncStatus, retry_count: Option<u32>) -> Update {
        let update = Update::new().set(S::status_field(), S::status_value(status));
        match retry_count {
            Some(count) => update.set(S::envelope_field(fields::RETRY_COUNT), count),
            None => update,
        }
    }

    fn date_clause(range: TimeRange) -> Option<Filter> {
        (!range.is_unbounded())
            .then(|| Filter::range(S::envelope_field(fields::LAST_FAILED_AT), range))
    }

    fn scoped(clause: Option<Filter>) -> Filter {
        Filter::and(clause.into_iter().chain([Self::failed_records()]))
    }
}
