//! Response mapping shared by the per-domain reprocess routes.

use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use reprocessor_core::{RecordId, SelectionParams};
use reprocessor_infra::{BatchSummary, ReprocessError, ReprocessStatus, SingleSummary};

use crate::app::errors::{json_error, reprocess_error_to_response};

pub(super) fn parse_record_id(raw: String) -> Result<RecordId, Response> {
    RecordId::new(raw).map_err(|e| reprocess_error_to_response(ReprocessError::Domain(e)))
}

pub(super) fn selection_params(
    query: Result<axum::extract::Query<SelectionParams>, QueryRejection>,
) -> Result<SelectionParams, Response> {
    query
        .map(|q| q.0)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text()))
}

pub(super) fn single_response(result: Result<SingleSummary, ReprocessError>) -> Response {
    match result {
        Ok(summary) if summary.status == ReprocessStatus::NoContent => StatusCode::NO_CONTENT.into_response(),
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => reprocess_error_to_response(e),
    }
}

pub(super) fn batch_response(result: Result<BatchSummary, ReprocessError>) -> Response {
    match result {
        Ok(summary) if summary.status == ReprocessStatus::NoContent => StatusCode::NO_CONTENT.into_response(),
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => reprocess_error_to_response(e),
    }
}
