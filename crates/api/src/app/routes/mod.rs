use axum::{Router, routing::get};

pub mod jobs;
pub mod system;

/// Router for every endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/health_check", get(system::health_check))
        .nest("/job", jobs::router())
}
