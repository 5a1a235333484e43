use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use jobrunner_api::config::{AppConfig, StoreConfig};
use jobrunner_infra::jobs::{InMemoryJobStore, JobRuntime, PostgresJobStore, SharedJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobrunner_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: SharedJobStore = match &config.store {
        StoreConfig::Postgres { url } => {
            let store = PostgresJobStore::connect(url, 10)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to create jobs schema")?;
            info!(store = "postgres", "job store ready");
            Arc::new(store)
        }
        StoreConfig::InMemory => {
            tracing::warn!("no database configured; job records are kept in memory");
            InMemoryJobStore::arc()
        }
    };

    let (jobs, runtime) = JobRuntime::start(store, config.runtime.clone());
    let app = jobrunner_api::app::build_app(jobs);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router, and with it the last JobService, is gone: the queue is closed.
    info!(grace_secs = config.shutdown_grace.as_secs(), "draining job runtime");
    runtime.shutdown(config.shutdown_grace).await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
