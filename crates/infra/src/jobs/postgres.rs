//! Postgres-backed job store.
//!
//! One row per job in the `jobs` table. The terminal write is a single
//! conditional `UPDATE ... WHERE status = 'pending'`, so a job's status,
//! worker and output change together and at most once even if two writers
//! ever raced on the same row.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` (insert only) |
//! | Database (other) | any | `Storage` |
//! | PoolClosed / Io / timeouts | N/A | `Storage` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use tracing::instrument;

use jobrunner_core::{Job, JobCompletion, JobId, JobOutput, JobStatus};

use super::store::{JobStore, JobStoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id      UUID PRIMARY KEY,
    cmd_string  TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'succeeded', 'failed')),
    worker      TEXT NOT NULL DEFAULT '',
    output      TEXT NOT NULL DEFAULT '',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const INDEX: &str = "CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at)";

/// Postgres-backed job store.
///
/// Uses the SQLx connection pool, which is `Send + Sync` and cheap to share.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, JobStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `jobs` table and its index if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        sqlx::query(INDEX)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn current_status(&self, job_id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let row = sqlx::query("SELECT status FROM jobs WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_status", e))?;

        row.map(|row| {
            let status: String = row
                .try_get("status")
                .map_err(|e| map_sqlx_error("current_status", e))?;
            status
                .parse::<JobStatus>()
                .map_err(|e| JobStoreError::Storage(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id,
                cmd_string,
                status,
                worker,
                output,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.command)
        .bind(job.status.as_str())
        .bind(&job.worker)
        .bind(job.output.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("insert", e)
            }
        })?;
        Ok(())
    }

    #[instrument(
        skip(self, completion),
        fields(job_id = %completion.job_id, status = %completion.status()),
        err
    )]
    async fn complete(&self, completion: &JobCompletion) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                worker = $3,
                output = $4,
                updated_at = NOW()
            WHERE job_id = $1 AND status = 'pending'
            "#,
        )
        .bind(completion.job_id.as_uuid())
        .bind(completion.status().as_str())
        .bind(&completion.worker)
        .bind(completion.output.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing updated: tell a missing row apart from one that already finished.
        match self.current_status(completion.job_id).await? {
            None => Err(JobStoreError::NotFound(completion.job_id)),
            Some(_) => Err(JobStoreError::AlreadyTerminal(completion.job_id)),
        }
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, cmd_string, status, worker, output, created_at, updated_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, cmd_string, status, worker, output, created_at, updated_at
            FROM jobs
            ORDER BY created_at ASC, job_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(row_to_job).collect()
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_row", e);

    let id: uuid::Uuid = row.try_get("job_id").map_err(decode)?;
    let command: String = row.try_get("cmd_string").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let worker: String = row.try_get("worker").map_err(decode)?;
    let output: String = row.try_get("output").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;

    let corrupt = |e: jobrunner_core::DomainError| {
        JobStoreError::Storage(format!("corrupt job row {id}: {e}"))
    };

    Ok(Job {
        id: JobId::from_uuid(id),
        command,
        status: status.parse().map_err(corrupt)?,
        worker,
        output: JobOutput::from_encoded(output).map_err(corrupt)?,
        created_at,
        updated_at,
    })
}

/// Map SQLx errors to JobStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::Storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
