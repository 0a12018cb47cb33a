use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use reprocessor_core::DomainError;
use reprocessor_infra::{ReprocessError, StoreError};

pub fn reprocess_error_to_response(err: ReprocessError) -> axum::response::Response {
    match err {
        ReprocessError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ReprocessError::Domain(DomainError::MalformedDocument(msg)) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "malformed_document", msg)
        }
        ReprocessError::Config(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "configuration_error",
            e.to_string(),
        ),
        ReprocessError::Store(e @ StoreError::Timeout { .. }) => {
            json_error(StatusCode::GATEWAY_TIMEOUT, "store_timeout", e.to_string())
        }
        ReprocessError::Store(e) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_error", e.to_string())
        }
        e @ ReprocessError::NotUpdated { .. } => {
            json_error(StatusCode::CONFLICT, "record_changed", e.to_string())
        }
        e @ ReprocessError::Publish { .. } => {
            json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reprocessor_infra::{ConfigError, QueueError};

    #[test]
    fn status_codes() {
        let cases = [
            (ReprocessError::Domain(DomainError::validation("bad date")), StatusCode::BAD_REQUEST),
            (
                ReprocessError::Config(ConfigError::Missing("REPROCESS_RETRY_LIMIT".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ReprocessError::Store(StoreError::Timeout {
                    operation: "find_many",
                    after: Duration::from_millis(5),
                }),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ReprocessError::Store(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ReprocessError::NotUpdated {
                    record_id: "C1".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                ReprocessError::Publish {
                    record_id: "O-1".into(),
                    source: QueueError::Rejected("nope".into()),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(reprocess_error_to_response(err).status(), expected);
        }
    }
}
