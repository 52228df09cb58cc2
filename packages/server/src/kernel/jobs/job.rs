//! Queue row model and its SQL.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
    Cancelled,
}

/// What kind of failure settled a job. Drives the retry decision in
/// `mark_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Retryable,
    NonRetryable,
    Cancelled,
    /// Interrupted by graceful shutdown; the work itself is fine.
    Shutdown,
}

impl ErrorKind {
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Shutdown)
    }
}

/// Column list shared by every query that reads full rows.
pub(crate) const JOB_COLUMNS: &str = "id, status, job_type, args, next_run_at, last_run_at, \
     max_retries, retry_count, lease_expires_at, worker_id, \
     error_message, error_kind, dead_lettered_at, dead_letter_reason, \
     root_job_id, attempt, idempotency_key, command_version, \
     created_at, updated_at";

/// One row in the `jobs` table: a serialized command plus its queue state.
///
/// Retries never mutate a settled row. `mark_failed` inserts a fresh pending
/// row via [`Job::create_retry`], so the chain from `root_job_id` through
/// each `attempt` stays inspectable after the fact.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub args: Option<serde_json::Value>,

    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,

    pub max_retries: i32,
    pub retry_count: i32,

    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,

    pub status: JobStatus,

    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub dead_letter_reason: Option<String>,

    pub root_job_id: Option<Uuid>,
    pub attempt: i32,

    pub idempotency_key: Option<String>,
    pub command_version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build the pending row for a serialized command.
    pub fn for_command(
        job_type: &str,
        args: serde_json::Value,
        run_at: Option<DateTime<Utc>>,
        idempotency_key: Option<String>,
        command_version: i32,
        max_retries: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.to_string(),
            args: Some(args),
            next_run_at: run_at,
            last_run_at: None,
            max_retries,
            retry_count: 0,
            lease_expires_at: None,
            worker_id: None,
            status: JobStatus::Pending,
            error_message: None,
            error_kind: None,
            dead_lettered_at: None,
            dead_letter_reason: None,
            root_job_id: None,
            attempt: 1,
            idempotency_key,
            command_version,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a claim would pick this job up right now.
    ///
    /// Readiness ignores the retry ceiling; `mark_failed` enforces it when
    /// a run settles, so every pending row eventually runs or dead-letters.
    pub fn is_ready(&self) -> bool {
        self.status == JobStatus::Pending
            && self.next_run_at.map_or(true, |at| at <= Utc::now())
    }

    /// The follow-up row for a failed run, linked to the chain's root.
    pub fn create_retry(&self, scheduled_for: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            next_run_at: Some(scheduled_for),
            last_run_at: None,
            retry_count: self.retry_count + 1,
            lease_expires_at: None,
            worker_id: None,
            status: JobStatus::Pending,
            error_message: None,
            error_kind: None,
            dead_lettered_at: None,
            dead_letter_reason: None,
            root_job_id: self.root_job_id.or(Some(self.id)),
            attempt: self.attempt + 1,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    pub async fn find_by_id(id: Uuid, db: &PgPool) -> Result<Self> {
        let job =
            sqlx::query_as::<_, Self>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
                .bind(id)
                .fetch_one(db)
                .await?;

        Ok(job)
    }

    /// Insert this row. Columns not bound here take their schema defaults;
    /// lease, error and timestamp fields all start empty or at NOW().
    pub async fn insert(&self, db: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(&format!(
            r#"
            INSERT INTO jobs (
                id, status, job_type, args, next_run_at,
                max_retries, retry_count, root_job_id, attempt,
                idempotency_key, command_version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(self.status)
        .bind(&self.job_type)
        .bind(&self.args)
        .bind(self.next_run_at)
        .bind(self.max_retries)
        .bind(self.retry_count)
        .bind(self.root_job_id)
        .bind(self.attempt)
        .bind(&self.idempotency_key)
        .bind(self.command_version)
        .fetch_one(db)
        .await?;

        Ok(job)
    }

    /// Atomically claim up to `batch` due jobs with FOR UPDATE SKIP LOCKED.
    ///
    /// Running rows whose lease expired are claimed again, which is how work
    /// lost to a dead runner re-enters circulation.
    pub async fn claim_due(
        batch: i64,
        worker_id: &str,
        lease_duration_ms: i64,
        db: &PgPool,
    ) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(&format!(
            r#"
            WITH due AS (
                SELECT id
                FROM jobs
                WHERE
                    (status = 'pending' AND (next_run_at IS NULL OR next_run_at <= NOW()))
                    OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY COALESCE(next_run_at, created_at)
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                status = 'running',
                last_run_at = COALESCE(last_run_at, NOW()),
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                worker_id = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM due)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(batch)
        .bind(lease_duration_ms.to_string())
        .bind(worker_id)
        .fetch_all(db)
        .await?;

        Ok(jobs)
    }

    /// Earliest future run time among pending jobs, if any.
    pub async fn next_scheduled_run(db: &PgPool) -> Result<Option<DateTime<Utc>>> {
        let next = sqlx::query_scalar::<_, DateTime<Utc>>(
            r#"
            SELECT next_run_at
            FROM jobs
            WHERE status = 'pending'
              AND next_run_at IS NOT NULL
            ORDER BY next_run_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(db)
        .await?;

        Ok(next)
    }
}
