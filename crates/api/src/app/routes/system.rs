use axum::{extract::Extension, response::IntoResponse, Json};

use jobrunner_infra::jobs::JobService;

/// Liveness plus the submission queue's backpressure signal.
pub async fn health_check(Extension(jobs): Extension<JobService>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": 1,
        "queued": jobs.queue_depth(),
        "queue_capacity": jobs.queue_capacity(),
    }))
}
