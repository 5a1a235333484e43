//! HTTP API application wiring (Axum router + job service).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and body rejection mapping
//! - `errors.rs`: consistent error responses

use axum::{Extension, Router};
use tower::ServiceBuilder;

use jobrunner_infra::jobs::JobService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(jobs: JobService) -> Router {
    routes::router()
        .layer(Extension(jobs))
        .layer(
            ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::request_logging)),
        )
}
