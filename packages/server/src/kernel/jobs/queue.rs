//! Durable command queue over Postgres.
//!
//! Commands are serialized into `jobs` rows and claimed in batches with
//! SKIP LOCKED. An idempotency key collapses concurrent enqueues onto the
//! live row that already carries the key, backed by a partial unique index
//! on pending rows.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::job::{ErrorKind, Job, JOB_COLUMNS};

/// Claim lease applied when the caller does not configure one.
const DEFAULT_CLAIM_LEASE_MS: i64 = 60_000;

/// Longest retry backoff the queue will schedule.
const MAX_RETRY_DELAY_SECS: i64 = 3_600;

/// What an enqueue produced: a fresh row, or the live row that already
/// carried the same idempotency key.
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    Created(Uuid),
    Duplicate(Uuid),
}

impl EnqueueResult {
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A job handed out by `claim`, payload still serialized.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    /// Deserialize the command payload into its typed form.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        let Some(args) = self.job.args.as_ref() else {
            return Err(anyhow!("job {} carries no payload", self.id));
        };

        serde_json::from_value(args.clone())
            .with_context(|| format!("{} payload did not deserialize", self.job.job_type))
    }

    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }

    pub fn command_version(&self) -> i32 {
        self.job.command_version
    }
}

/// Metadata a command supplies when it is lowered into a job row.
pub trait CommandMeta {
    /// Stored as the row's `job_type` and used for handler dispatch.
    fn command_type(&self) -> &'static str;

    /// When present, at most one pending or running row carries this key.
    fn idempotency_key(&self) -> Option<String> {
        None
    }

    /// Bumped when a payload's shape changes.
    fn command_version(&self) -> i32 {
        1
    }

    fn max_retries(&self) -> i32 {
        3
    }
}

/// A fully-specified unit of work, ready to be stored.
///
/// Typed commands are lowered to this before hitting the queue so the
/// trait stays object safe.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct JobSpec {
    pub job_type: String,
    pub args: serde_json::Value,
    #[builder(default, setter(strip_option))]
    pub run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,
    #[builder(default = 1)]
    pub command_version: i32,
    #[builder(default = 3)]
    pub max_retries: i32,
}

impl JobSpec {
    /// Lower a typed command into a spec, serializing its payload.
    pub fn for_command<C>(command: &C, run_at: Option<DateTime<Utc>>) -> Result<Self>
    where
        C: Serialize + CommandMeta,
    {
        Ok(Self {
            job_type: command.command_type().to_string(),
            args: serde_json::to_value(command)?,
            run_at,
            idempotency_key: command.idempotency_key(),
            command_version: command.command_version(),
            max_retries: command.max_retries(),
        })
    }
}

/// Storage operations for serialized commands.
///
/// The typed `enqueue`/`schedule` entry points live on [`JobQueueExt`] so
/// this trait stays object safe and can sit behind an `Arc<dyn JobQueue>`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Store a spec for execution.
    ///
    /// When the spec carries an idempotency key and a pending or running row
    /// already holds it, answers `Duplicate` with that row's id.
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult>;

    /// Hand out up to `limit` due jobs, leased to `worker_id`.
    ///
    /// SKIP LOCKED keeps concurrent claimers from blocking each other.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    /// Settle a job as succeeded.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Settle a job as failed.
    ///
    /// A retryable failure with attempts left schedules a fresh retry row;
    /// anything else dead-letters the job.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;

    /// Cancel a job, reporting whether a row was actually cancelled.
    ///
    /// Only pending rows cancel. A running job finishes its current pass
    /// and the cancellation is visible before the next claim.
    async fn cancel(&self, job_id: Uuid) -> Result<bool>;

    /// Push out the lease on a running job.
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;

    /// Earliest scheduled run across pending jobs, for sleep tuning.
    async fn next_run_time(&self) -> Result<Option<DateTime<Utc>>>;
}

/// Typed convenience methods over any [`JobQueue`].
#[async_trait]
pub trait JobQueueExt: JobQueue {
    /// Enqueue a command for immediate execution.
    async fn enqueue<C>(&self, command: C) -> Result<EnqueueResult>
    where
        C: Serialize + Send + Sync + CommandMeta,
    {
        self.enqueue_spec(JobSpec::for_command(&command, None)?).await
    }

    /// Schedule a command for future execution.
    async fn schedule<C>(&self, command: C, run_at: DateTime<Utc>) -> Result<EnqueueResult>
    where
        C: Serialize + Send + Sync + CommandMeta,
    {
        self.enqueue_spec(JobSpec::for_command(&command, Some(run_at))?)
            .await
    }
}

impl<Q: JobQueue + ?Sized> JobQueueExt for Q {}

/// Postgres-backed queue.
#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    default_lease_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self::with_lease_duration(pool, DEFAULT_CLAIM_LEASE_MS)
    }

    /// Create with a custom claim lease duration.
    pub fn with_lease_duration(pool: PgPool, lease_ms: i64) -> Self {
        Self {
            pool,
            default_lease_ms: lease_ms,
        }
    }

    pub fn default_lease_ms(&self) -> i64 {
        self.default_lease_ms
    }

    /// Look up the live row carrying this idempotency key, if any.
    ///
    /// Settled rows do not count; a key becomes reusable once its job
    /// finishes or is cancelled.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE idempotency_key = $1
              AND status IN ('pending', 'running')
            LIMIT 1
            "#
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue_spec(&self, spec: JobSpec) -> Result<EnqueueResult> {
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing) = self.find_by_idempotency_key(key).await? {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = Job::for_command(
            &spec.job_type,
            spec.args,
            spec.run_at,
            spec.idempotency_key.clone(),
            spec.command_version,
            spec.max_retries,
        );

        match job.insert(&self.pool).await {
            Ok(inserted) => Ok(EnqueueResult::Created(inserted.id)),
            Err(error) => {
                // A racing enqueue can beat us past the pre-check; the unique
                // index on pending idempotency keys rejects our insert, and
                // the winner's row is the answer.
                if let Some(key) = &spec.idempotency_key {
                    if let Some(existing) = self.find_by_idempotency_key(key).await? {
                        return Ok(EnqueueResult::Duplicate(existing.id));
                    }
                }
                Err(error)
            }
        }
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim_due(limit, worker_id, self.default_lease_ms, &self.pool).await?;

        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = Job::find_by_id(job_id, &self.pool).await?;

        if kind.should_retry() && job.retry_count < job.max_retries {
            // The retry is its own pending row; this one stays behind as the
            // record of the attempt.
            let delay = chrono::Duration::seconds(retry_delay_secs(job.retry_count));
            job.create_retry(Utc::now() + delay).insert(&self.pool).await?;

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', error_message = $1, error_kind = $2, updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead_letter', error_message = $1, error_kind = $2,
                    dead_lettered_at = NOW(), dead_letter_reason = 'max retries exceeded',
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', error_kind = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL, updated_at = NOW()
            WHERE id = $2 AND status = 'running'
            "#,
        )
        .bind(self.default_lease_ms.to_string())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn next_run_time(&self) -> Result<Option<DateTime<Utc>>> {
        Job::next_scheduled_run(&self.pool).await
    }
}

/// Exponential backoff per retry, capped at [`MAX_RETRY_DELAY_SECS`].
fn retry_delay_secs(retry_count: i32) -> i64 {
    2i64.pow(retry_count as u32).min(MAX_RETRY_DELAY_SECS)
}
