use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::app::errors;

/// Body of `POST /job`.
///
/// Only `cmd_string` is read; `job_id`, `status`, `worker` and `output` sent
/// by a client are ignored.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub cmd_string: Option<String>,
}

impl SubmitJobRequest {
    pub fn into_command(self) -> Result<String, axum::response::Response> {
        match self.cmd_string {
            Some(cmd) if !cmd.trim().is_empty() => Ok(cmd),
            _ => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "cmd_string is required",
            )),
        }
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}
