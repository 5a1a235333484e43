//! Submission and query entry point used by the HTTP layer.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, warn};

use jobrunner_core::{DomainError, Job, JobId};

use super::store::{JobStoreError, SharedJobStore};
use crate::workers::pool::JobQueue;

/// Why a submission was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("submission queue is full")]
    Saturated,
    #[error("job runner is shutting down")]
    Closed,
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Store plus submission queue.
#[derive(Clone)]
pub struct JobService {
    store: SharedJobStore,
    queue: JobQueue,
}

impl JobService {
    pub fn new(store: SharedJobStore, queue: JobQueue) -> Self {
        Self { store, queue }
    }

    /// Persist a new pending job and queue it for execution.
    ///
    /// A queue slot is reserved before the insert, so a saturated runner
    /// refuses the job without leaving a pending row behind. Returns as soon
    /// as the job is queued.
    #[instrument(skip(self, command), err)]
    pub async fn submit(&self, command: impl Into<String>) -> Result<JobId, SubmitError> {
        let job = Job::new(command)?;

        let permit = match self.queue.sender().try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                warn!(queued = self.queue.depth(), "submission refused: queue full");
                return Err(SubmitError::Saturated);
            }
            Err(TrySendError::Closed(())) => return Err(SubmitError::Closed),
        };

        // Dropping the permit on error releases the slot.
        self.store.insert(&job).await?;

        let id = job.id;
        info!(job_id = %id, "job submitted");
        debug!(job_id = %id, command = %job.command, "submitted command");
        permit.send(job);
        Ok(id)
    }

    pub async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.store.get(job_id).await
    }

    pub async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        self.store.list().await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }
}
