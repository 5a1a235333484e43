//! Shell job pipeline.
//!
//! ## Components
//!
//! - `JobStore`: persistence for job records (in-memory or Postgres)
//! - `ShellExecutor`: runs one command, produces a `JobCompletion`
//! - completion channel: bounded FIFO from executors to the status updater
//! - `JobService`: validates, persists and queues submissions
//! - `JobRuntime`: wires workers, channel and updater at startup

pub mod completion;
pub mod executor;
pub mod postgres;
pub mod runtime;
pub mod service;
pub mod store;

pub use completion::{
    CompletionClosed, CompletionReceiver, CompletionSender, DEFAULT_COMPLETION_CAPACITY,
    completion_channel,
};
pub use executor::{DEFAULT_SHELL, ExecutionResult, ShellExecutor};
pub use postgres::PostgresJobStore;
pub use runtime::{JobRuntime, JobRuntimeConfig};
pub use service::{JobService, SubmitError};
pub use store::{InMemoryJobStore, JobStore, JobStoreError, SharedJobStore};
