use std::time::Instant;

use axum::{
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log every request/response pair under a request id.
///
/// The caller's `x-request-id` is reused when present, otherwise a fresh
/// UUIDv7 is generated. The id is echoed back on the response.
pub async fn request_logging(req: Request<axum::body::Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();

    let mut response = async move {
        info!(marker = "REQUEST-INBOUND", "request received");
        let response = next.run(req).await;
        info!(
            marker = "RESPONSE-OUTBOUND",
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response sent"
        );
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
