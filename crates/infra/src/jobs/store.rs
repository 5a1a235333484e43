//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jobrunner_core::{Job, JobCompletion, JobId};

/// Shared handle to whichever store the process was configured with.
pub type SharedJobStore = Arc<dyn JobStore>;

/// Job store abstraction.
///
/// The pipeline calls `insert` once per job at submission and `complete` once
/// per job from the status updater. Implementations must make `complete`
/// a single atomic pending→terminal update.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job.
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Record a job's terminal status, worker and output.
    ///
    /// Rejects unknown jobs and jobs that are no longer pending.
    async fn complete(&self, completion: &JobCompletion) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// List all jobs, oldest first.
    async fn list(&self) -> Result<Vec<Job>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job already has a terminal status: {0}")]
    AlreadyTerminal(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    /// Whether repeating the same write could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobStoreError::Storage(_))
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("in-memory job store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn complete(&self, completion: &JobCompletion) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let job = jobs
            .get_mut(&completion.job_id)
            .ok_or(JobStoreError::NotFound(completion.job_id))?;

        job.apply_completion(completion)
            .map_err(|_| JobStoreError::AlreadyTerminal(completion.job_id))
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs.values().cloned().collect();

        // Sort by created_at to keep listing order stable
        result.sort_by_key(|j| (j.created_at, j.id));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrunner_core::{JobOutcome, JobOutput, JobStatus};

    fn succeeded(job: &Job, bytes: &[u8]) -> JobCompletion {
        JobCompletion::new(job.id, JobOutcome::Succeeded, "test/worker-0", JobOutput::encode(bytes))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = InMemoryJobStore::new();
        let job = Job::new("echo hi").unwrap();

        store.insert(&job).await.unwrap();

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = Job::new("echo hi").unwrap();

        store.insert(&job).await.unwrap();
        let err = store.insert(&job).await.unwrap_err();

        assert_eq!(err, JobStoreError::AlreadyExists(job.id));
    }

    #[tokio::test]
    async fn completion_is_recorded_once() {
        let store = InMemoryJobStore::new();
        let job = Job::new("echo hi").unwrap();
        store.insert(&job).await.unwrap();

        store.complete(&succeeded(&job, b"hi\n")).await.unwrap();
        let err = store.complete(&succeeded(&job, b"again")).await.unwrap_err();
        assert_eq!(err, JobStoreError::AlreadyTerminal(job.id));

        let loaded = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Succeeded);
        assert_eq!(loaded.output.decode().unwrap(), b"hi\n");
        assert_eq!(loaded.worker, "test/worker-0");
    }

    #[tokio::test]
    async fn completion_for_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let job = Job::new("echo hi").unwrap();

        let err = store.complete(&succeeded(&job, b"")).await.unwrap_err();

        assert_eq!(err, JobStoreError::NotFound(job.id));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.get(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let job = Job::new(format!("echo {i}")).unwrap();
            ids.push(job.id);
            store.insert(&job).await.unwrap();
        }

        let listed: Vec<_> = store.list().await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(listed, ids);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn only_storage_errors_are_transient() {
        assert!(JobStoreError::Storage("connection reset".into()).is_transient());
        assert!(!JobStoreError::AlreadyTerminal(JobId::new()).is_transient());
        assert!(!JobStoreError::AlreadyExists(JobId::new()).is_transient());
    }
}
