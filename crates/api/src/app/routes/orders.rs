use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, Query, rejection::QueryRejection},
    response::Response,
    routing::post,
};

use reprocessor_core::SelectionParams;

use crate::app::services::AppServices;

use super::reprocess::{batch_response, parse_record_id, selection_params, single_response};

pub fn router() -> Router {
    Router::new()
        .route("/reprocess", post(reprocess_all))
        .route("/:id/reprocess", post(reprocess_one))
}

/// Reprocess one failed order by id.
async fn reprocess_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_record_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    single_response(services.orders.reprocess_single(&id).await)
}

async fn reprocess_all(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<SelectionParams>, QueryRejection>,
) -> Response {
    let params = match selection_params(query) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    batch_response(services.orders.reprocess_batch(&params).await)
}
