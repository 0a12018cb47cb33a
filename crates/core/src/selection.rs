//! Batch selection parameters and their resolution to a store filter.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::filter::{Filter, TimeRange};
use crate::query::{parse_time_range, AttributeParams, QueryBuilder};
use crate::schema::{Attribute, DomainSchema};

/// Parameters of a batch reprocessing request.
///
/// Field names on the wire follow the original HTTP contract
/// (`filter[orderId]`, `errorCode`, ...). Blank values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionParams {
    /// `from..to` range on the last failed attempt; either side may be empty.
    #[serde(rename = "filter[lastFailedAttemptTimeDate]", default)]
    pub last_failed_range: Option<String>,

    #[serde(
        rename = "filter[id]",
        alias = "filter[orderId]",
        alias = "filter[businessPartnerId]",
        default
    )]
    pub record_id: Option<String>,

    #[serde(rename = "filter[customerNumber]", default)]
    pub customer_number: Option<String>,

    #[serde(rename = "filter[poNumber]", default)]
    pub po_number: Option<String>,

    #[serde(
        rename = "filter[timeofOrderCreation]",
        alias = "filter[timeOfCreation]",
        default
    )]
    pub creation_time: Option<String>,

    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,

    #[serde(rename = "fromDate", default)]
    pub from_date: Option<String>,

    #[serde(rename = "toDate", default)]
    pub to_date: Option<String>,

    /// Caller-imposed cap on the number of records processed.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Which selection path a request takes. Paths are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit `filter[lastFailedAttemptTimeDate]` range.
    LastFailedRange(TimeRange),
    /// One attribute (highest priority wins).
    Attribute { attribute: Attribute, value: String },
    /// Error code and/or `fromDate`/`toDate`.
    ErrorCodeAndDate {
        error_code: Option<String>,
        range: TimeRange,
    },
    /// Every `CREATE-FAILED` record.
    Status,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SelectionParams {
    pub fn attributes(&self) -> AttributeParams {
        AttributeParams {
            record_id: present(&self.record_id).map(str::to_string),
            customer_number: present(&self.customer_number).map(str::to_string),
            po_number: present(&self.po_number).map(str::to_string),
            creation_time: present(&self.creation_time).map(str::to_string),
        }
    }

    /// Resolve the selection path.
    ///
    /// Precedence: explicit date-range filter, then attribute filter, then
    /// error-code/date filter, then plain status.
    pub fn selection(&self) -> DomainResult<Selection> {
        if let Some(raw) = present(&self.last_failed_range) {
            let (from, to) = split_range(raw)?;
            return Ok(Selection::LastFailedRange(parse_time_range(from, to)?));
        }

        if let Some((attribute, value)) = self.attributes().first() {
            return Ok(Selection::Attribute {
                attribute,
                value: value.to_string(),
            });
        }

        let error_code = present(&self.error_code);
        let from = present(&self.from_date);
        let to = present(&self.to_date);
        if error_code.is_some() || from.is_some() || to.is_some() {
            return Ok(Selection::ErrorCodeAndDate {
                error_code: error_code.map(str::to_string),
                range: parse_time_range(from, to)?,
            });
        }

        Ok(Selection::Status)
    }

    /// Store filter for domain `S`.
    pub fn to_filter<S: DomainSchema>(&self) -> DomainResult<Filter> {
        Ok(match self.selection()? {
            Selection::LastFailedRange(range) => QueryBuilder::<S>::filter_by_time_range(range),
            Selection::Attribute { attribute, value } => {
                QueryBuilder::<S>::filter_by_attribute(attribute, &value)?
            }
            Selection::ErrorCodeAndDate { error_code, range } => {
                QueryBuilder::<S>::filter_by_error_code_and_range(error_code.as_deref(), range)
            }
            Selection::Status => QueryBuilder::<S>::failed_records(),
        })
    }
}

/// Split `from..to` into optional bounds.
fn split_range(raw: &str) -> DomainResult<(Option<&str>, Option<&str>)> {
    let (from, to) = raw.split_once("..").ok_or_else(|| {
        DomainError::validation(format!("date range must look like `from..to`, got {raw:?}"))
    })?;
    Ok((bound(from), bound(to)))
}

fn bound(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}
