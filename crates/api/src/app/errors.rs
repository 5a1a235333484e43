use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobrunner_infra::jobs::{JobStoreError, SubmitError};

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::Invalid(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        SubmitError::Saturated => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "saturated",
            "submission queue is full; retry later",
        ),
        SubmitError::Closed => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "job runner is shutting down",
        ),
        SubmitError::Store(e) => store_error_to_response(e),
    }
}

pub fn store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        other => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
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
