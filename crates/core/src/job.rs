//! The job record and its lifecycle.
//!
//! A job is created `pending` and moves to exactly one terminal status exactly
//! once. There is no `running` state: from the outside a job is pending until
//! its result has been persisted.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;
use crate::output::JobOutput;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and persisted, result not yet recorded
    Pending,
    /// Command ran and exited 0
    Succeeded,
    /// Command exited non-zero, was killed, or could not be launched
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Terminal result of running a job. Has no `pending` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

impl JobOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            JobOutcome::Succeeded
        } else {
            JobOutcome::Failed
        }
    }
}

impl From<JobOutcome> for JobStatus {
    fn from(value: JobOutcome) -> Self {
        match value {
            JobOutcome::Succeeded => JobStatus::Succeeded,
            JobOutcome::Failed => JobStatus::Failed,
        }
    }
}

/// A submitted shell command and its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    #[serde(rename = "job_id")]
    pub id: JobId,
    /// Shell command text
    #[serde(rename = "cmd_string")]
    pub command: String,
    /// Current status
    pub status: JobStatus,
    /// Label of the worker that produced the result (empty while pending)
    pub worker: String,
    /// Combined stdout/stderr, base64 (empty while pending)
    pub output: JobOutput,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last updated
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job with a fresh identifier.
    pub fn new(command: impl Into<String>) -> DomainResult<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(DomainError::validation("cmd_string must not be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            command,
            status: JobStatus::Pending,
            worker: String::new(),
            output: JobOutput::empty(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Record the terminal result.
    ///
    /// Fails if the completion belongs to another job or if this job already
    /// has a terminal status; status, worker and output change together or
    /// not at all.
    pub fn apply_completion(&mut self, completion: &JobCompletion) -> DomainResult<()> {
        if completion.job_id != self.id {
            return Err(DomainError::illegal_transition(format!(
                "completion for {} applied to {}",
                completion.job_id, self.id
            )));
        }
        if self.status.is_terminal() {
            return Err(DomainError::illegal_transition(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }

        self.status = completion.status();
        self.worker = completion.worker.clone();
        self.output = completion.output.clone();
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Message sent from an executor to the status updater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub job_id: JobId,
    pub outcome: JobOutcome,
    pub worker: String,
    pub output: JobOutput,
}

impl JobCompletion {
    pub fn new(
        job_id: JobId,
        outcome: JobOutcome,
        worker: impl Into<String>,
        output: JobOutput,
    ) -> Self {
        Self {
            job_id,
            outcome,
            worker: worker.into(),
            output,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.outcome.into()
    }
}
