//! Long-lived background tasks of the job pipeline.

pub mod pool;
pub mod status_updater;

pub use pool::{DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY, JobQueue, WorkerPool};
pub use status_updater::{StatusUpdater, UpdaterStats, WriteRetry};
