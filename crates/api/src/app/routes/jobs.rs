use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use jobrunner_core::JobId;
use jobrunner_infra::jobs::JobService;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/:job_id", get(get_job))
}

pub async fn submit_job(
    Extension(jobs): Extension<JobService>,
    body: Result<Json<dto::SubmitJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return dto::json_rejection_to_response(rejection),
    };
    let command = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match jobs.submit(command).await {
        Ok(id) => (StatusCode::CREATED, Json(id)).into_response(),
        Err(e) => errors::submit_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(jobs): Extension<JobService>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match job_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"),
    };

    match jobs.get(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_jobs(Extension(jobs): Extension<JobService>) -> axum::response::Response {
    match jobs.list().await {
        Ok(all) => Json(all).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
