//! `jobrunner-core`: the job model shared by the pipeline and the API.
//!
//! This crate is pure data and rules (no I/O): identifiers, the job record and
//! its one-way lifecycle, and the binary-safe output encoding.

pub mod error;
pub mod id;
pub mod job;
pub mod output;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{Job, JobCompletion, JobOutcome, JobStatus};
pub use output::JobOutput;
