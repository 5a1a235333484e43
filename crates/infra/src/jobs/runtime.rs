//! Startup wiring for the job pipeline and its orderly shutdown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::completion::{DEFAULT_COMPLETION_CAPACITY, completion_channel};
use super::executor::{DEFAULT_SHELL, ShellExecutor};
use super::service::JobService;
use super::store::SharedJobStore;
use crate::workers::pool::{DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY, WorkerPool};
use crate::workers::status_updater::{StatusUpdater, UpdaterStats, WriteRetry};

/// Job pipeline configuration.
#[derive(Debug, Clone)]
pub struct JobRuntimeConfig {
    /// Prefix of worker labels
    pub name: String,
    /// Number of executor workers
    pub pool_size: usize,
    /// Submission queue capacity
    pub queue_capacity: usize,
    /// Completion channel capacity
    pub completion_capacity: usize,
    /// Shell used as `<shell> -c <command>`
    pub shell: String,
    /// Per-job timeout
    pub job_timeout: Option<Duration>,
    /// Status updater write retry
    pub write_retry: WriteRetry,
}

impl Default for JobRuntimeConfig {
    fn default() -> Self {
        Self {
            name: "jobrunner".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            completion_capacity: DEFAULT_COMPLETION_CAPACITY,
            shell: DEFAULT_SHELL.to_string(),
            job_timeout: None,
            write_retry: WriteRetry::default(),
        }
    }
}

impl JobRuntimeConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_completion_capacity(mut self, capacity: usize) -> Self {
        self.completion_capacity = capacity;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_write_retry(mut self, retry: WriteRetry) -> Self {
        self.write_retry = retry;
        self
    }
}

/// Running workers and status updater.
///
/// Dropping every [`JobService`] clone closes the submission queue; then
/// [`JobRuntime::shutdown`] waits for the pipeline to drain.
#[derive(Debug)]
pub struct JobRuntime {
    pool: WorkerPool,
    updater: JoinHandle<UpdaterStats>,
}

impl JobRuntime {
    /// Build the channels, spawn the workers and the updater.
    pub fn start(store: SharedJobStore, config: JobRuntimeConfig) -> (JobService, JobRuntime) {
        let (completion_tx, completion_rx) = completion_channel(config.completion_capacity);

        let updater = StatusUpdater::new(store.clone())
            .with_retry(config.write_retry)
            .spawn(completion_rx);

        let executor = ShellExecutor::new(config.shell.clone()).with_timeout(config.job_timeout);
        let (queue, pool) = WorkerPool::spawn(
            &config.name,
            config.pool_size,
            config.queue_capacity,
            executor,
            completion_tx,
        );

        info!(
            workers = pool.size(),
            queue_capacity = queue.capacity(),
            completion_capacity = config.completion_capacity.max(1),
            shell = %config.shell,
            timeout_secs = ?config.job_timeout.map(|t| t.as_secs()),
            "job runtime started"
        );

        (JobService::new(store, queue), JobRuntime { pool, updater })
    }

    /// Wait up to `grace` for queued jobs to run and their results to be
    /// persisted. Call after the last [`JobService`] is dropped.
    ///
    /// Returns `true` when everything drained in time.
    pub async fn shutdown(self, grace: Duration) -> bool {
        let JobRuntime { pool, updater } = self;
        let abort_workers = pool.abort_handles();
        let abort_updater = updater.abort_handle();

        let drain = async move {
            let ran = pool.join().await;
            let stats = updater.await;
            (ran, stats)
        };

        match tokio::time::timeout(grace, drain).await {
            Ok((ran, Ok(stats))) => {
                info!(
                    jobs_run = ran,
                    persisted = stats.persisted,
                    dropped = stats.dropped,
                    "job runtime drained"
                );
                true
            }
            Ok((_, Err(err))) => {
                warn!(error = %err, "status updater ended abnormally");
                false
            }
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "job runtime did not drain in time; aborting");
                for handle in abort_workers {
                    handle.abort();
                }
                abort_updater.abort();
                false
            }
        }
    }
}
