//! Single consumer that persists job results from the completion channel.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use jobrunner_core::JobCompletion;

use crate::jobs::completion::CompletionReceiver;
use crate::jobs::store::{JobStoreError, SharedJobStore};

/// How the updater retries a failed terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRetry {
    /// Total attempts per completion, at least 1
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for WriteRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

impl WriteRetry {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Try once, never retry.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }
}

/// Counters reported when the updater stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterStats {
    pub persisted: u64,
    pub dropped: u64,
    pub retries: u64,
}

/// The single consumer of the completion channel.
///
/// - Persists each completion's status, worker and output through the store
/// - One write at a time, in channel order
/// - A failed write is logged and the loop moves on
/// - Stops once every sender is gone and the channel is drained
#[derive(Clone)]
pub struct StatusUpdater {
    store: SharedJobStore,
    retry: WriteRetry,
}

impl StatusUpdater {
    pub fn new(store: SharedJobStore) -> Self {
        Self {
            store,
            retry: WriteRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: WriteRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Run the updater on its own task.
    pub fn spawn(self, rx: CompletionReceiver) -> JoinHandle<UpdaterStats> {
        tokio::spawn(self.run(rx))
    }

    /// Consume completions until the channel closes.
    pub async fn run(self, mut rx: CompletionReceiver) -> UpdaterStats {
        let mut stats = UpdaterStats::default();
        info!(max_attempts = self.retry.max_attempts, "status updater started");

        while let Some(completion) = rx.recv().await {
            match self.persist(&completion, &mut stats).await {
                Ok(()) => {
                    stats.persisted += 1;
                    info!(
                        job_id = %completion.job_id,
                        worker = %completion.worker,
                        status = %completion.status(),
                        "job result persisted"
                    );
                }
                Err(err) => {
                    stats.dropped += 1;
                    warn!(
                        job_id = %completion.job_id,
                        worker = %completion.worker,
                        status = %completion.status(),
                        error = %err,
                        "failed to persist job result"
                    );
                }
            }
        }

        info!(
            persisted = stats.persisted,
            dropped = stats.dropped,
            "status updater stopped"
        );
        stats
    }

    async fn persist(
        &self,
        completion: &JobCompletion,
        stats: &mut UpdaterStats,
    ) -> Result<(), JobStoreError> {
        let mut attempt = 1;
        loop {
            match self.store.complete(completion).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    debug!(
                        job_id = %completion.job_id,
                        attempt,
                        error = %err,
                        "retrying job result write"
                    );
                    stats.retries += 1;
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
