//! Postgres-backed summary job store.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::summarize::error::{Result, SummarizeError};
use crate::summarize::model::{
    ChunkTransition, JobOutcome, NewSummaryJob, SummaryChunk, SummaryJob,
};
use crate::summarize::store::SummaryStore;

const JOB_COLUMNS: &str = "fingerprint, page_url, title, mode, include_comments, model, api_key, \
                           status, chunk_count, summary, error_message, worker_id, \
                           lease_expires_at, created_at, updated_at";

/// Production store over `summary_jobs` and `summary_chunks`.
#[derive(Clone)]
pub struct PostgresSummaryStore {
    pool: PgPool,
}

impl PostgresSummaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummaryStore for PostgresSummaryStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<SummaryJob>> {
        let job = sqlx::query_as::<_, SummaryJob>(&format!(
            "SELECT {} FROM summary_jobs WHERE fingerprint = $1",
            JOB_COLUMNS
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_chunks(&self, fingerprint: &str) -> Result<Vec<SummaryChunk>> {
        let chunks = sqlx::query_as::<_, SummaryChunk>(
            r#"
            SELECT fingerprint, chunk_index, text, status, summary, attempts, updated_at
            FROM summary_chunks
            WHERE fingerprint = $1
            ORDER BY chunk_index
            "#,
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;

        Ok(chunks)
    }

    async fn create(&self, new_job: NewSummaryJob) -> Result<SummaryJob> {
        let mut tx = self.pool.begin().await?;

        let initial_status = if new_job.chunks.is_empty() {
            "planning"
        } else {
            "summarizing"
        };

        let insert = sqlx::query_as::<_, SummaryJob>(&format!(
            r#"
            INSERT INTO summary_jobs (
                fingerprint, page_url, title, mode, include_comments, model,
                api_key, status, chunk_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::summary_job_status, $9)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(&new_job.fingerprint)
        .bind(&new_job.page_url)
        .bind(&new_job.title)
        .bind(new_job.mode)
        .bind(new_job.include_comments)
        .bind(&new_job.model)
        .bind(&new_job.api_key)
        .bind(initial_status)
        .bind(new_job.chunks.len() as i32)
        .fetch_one(&mut *tx)
        .await;

        let job = match insert {
            Ok(job) => job,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(SummarizeError::AlreadyExists(new_job.fingerprint));
            }
            Err(e) => return Err(e.into()),
        };

        for (index, text) in new_job.chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO summary_chunks (fingerprint, chunk_index, text)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(&new_job.fingerprint)
            .bind(index as i32)
            .bind(text)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(job)
    }

    async fn update_chunk(
        &self,
        fingerprint: &str,
        chunk_index: i32,
        transition: ChunkTransition,
    ) -> Result<()> {
        match transition {
            ChunkTransition::Summarized { summary } => {
                // Write-once: a chunk that already has a summary keeps it.
                sqlx::query(
                    r#"
                    UPDATE summary_chunks
                    SET status = 'summarized', summary = $3, updated_at = NOW()
                    WHERE fingerprint = $1 AND chunk_index = $2 AND summary IS NULL
                    "#,
                )
                .bind(fingerprint)
                .bind(chunk_index)
                .bind(summary)
                .execute(&self.pool)
                .await?;
            }
            ChunkTransition::AttemptFailed => {
                sqlx::query(
                    r#"
                    UPDATE summary_chunks
                    SET attempts = attempts + 1, updated_at = NOW()
                    WHERE fingerprint = $1 AND chunk_index = $2 AND status = 'pending'
                    "#,
                )
                .bind(fingerprint)
                .bind(chunk_index)
                .execute(&self.pool)
                .await?;
            }
            ChunkTransition::Failed => {
                sqlx::query(
                    r#"
                    UPDATE summary_chunks
                    SET status = 'failed', updated_at = NOW()
                    WHERE fingerprint = $1 AND chunk_index = $2 AND status = 'pending'
                    "#,
                )
                .bind(fingerprint)
                .bind(chunk_index)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn finalize(&self, fingerprint: &str, outcome: JobOutcome) -> Result<()> {
        match outcome {
            JobOutcome::Complete { summary } => {
                sqlx::query(
                    r#"
                    UPDATE summary_jobs
                    SET status = 'complete', summary = $2, error_message = NULL,
                        worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
                    WHERE fingerprint = $1 AND status NOT IN ('complete', 'failed')
                    "#,
                )
                .bind(fingerprint)
                .bind(summary)
                .execute(&self.pool)
                .await?;
            }
            JobOutcome::Failed { message } => {
                sqlx::query(
                    r#"
                    UPDATE summary_jobs
                    SET status = 'failed', error_message = $2,
                        worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
                    WHERE fingerprint = $1 AND status NOT IN ('complete', 'failed')
                    "#,
                )
                .bind(fingerprint)
                .bind(message)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    async fn acquire_lease(
        &self,
        fingerprint: &str,
        worker_id: &str,
        duration_ms: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE summary_jobs
            SET worker_id = $2,
                lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE fingerprint = $1
              AND status NOT IN ('complete', 'failed')
              AND (lease_expires_at IS NULL OR lease_expires_at < NOW() OR worker_id = $2)
            "#,
        )
        .bind(fingerprint)
        .bind(worker_id)
        .bind(duration_ms.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn renew_lease(
        &self,
        fingerprint: &str,
        worker_id: &str,
        duration_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE summary_jobs
            SET lease_expires_at = NOW() + ($3 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE fingerprint = $1 AND worker_id = $2
            "#,
        )
        .bind(fingerprint)
        .bind(worker_id)
        .bind(duration_ms.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release_lease(&self, fingerprint: &str, worker_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE summary_jobs
            SET worker_id = NULL, lease_expires_at = NULL, updated_at = NOW()
            WHERE fingerprint = $1 AND worker_id = $2
            "#,
        )
        .bind(fingerprint)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn begin_aggregation(&self, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE summary_jobs
            SET status = 'aggregating', updated_at = NOW()
            WHERE fingerprint = $1 AND status = 'summarizing'
            "#,
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
