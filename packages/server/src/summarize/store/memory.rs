//! In-memory summary job store for testing and development.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::summarize::error::{Result, SummarizeError};
use crate::summarize::model::{
    ChunkStatus, ChunkTransition, JobOutcome, NewSummaryJob, SummaryChunk, SummaryJob,
    SummaryJobStatus,
};
use crate::summarize::store::SummaryStore;

struct StoredJob {
    job: SummaryJob,
    chunks: Vec<SummaryChunk>,
}

/// In-memory store with the same semantics as the Postgres store.
///
/// Not persistent. Useful for unit tests and local development without
/// a database.
#[derive(Default)]
pub struct MemorySummaryStore {
    jobs: RwLock<HashMap<String, StoredJob>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap().len()
    }

    /// Remove all stored jobs.
    pub fn clear(&self) {
        self.jobs.write().unwrap().clear();
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn get(&self, fingerprint: &str) -> Result<Option<SummaryJob>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .get(fingerprint)
            .map(|stored| stored.job.clone()))
    }

    async fn get_chunks(&self, fingerprint: &str) -> Result<Vec<SummaryChunk>> {
        Ok(self
            .jobs
            .read()
            .unwrap()
            .get(fingerprint)
            .map(|stored| stored.chunks.clone())
            .unwrap_or_default())
    }

    async fn create(&self, new_job: NewSummaryJob) -> Result<SummaryJob> {
        let mut jobs = self.jobs.write().unwrap();

        if jobs.contains_key(&new_job.fingerprint) {
            return Err(SummarizeError::AlreadyExists(new_job.fingerprint));
        }

        let status = if new_job.chunks.is_empty() {
            SummaryJobStatus::Planning
        } else {
            SummaryJobStatus::Summarizing
        };

        let now = Utc::now();
        let chunks: Vec<SummaryChunk> = new_job
            .chunks
            .iter()
            .enumerate()
            .map(|(index, text)| SummaryChunk {
                fingerprint: new_job.fingerprint.clone(),
                chunk_index: index as i32,
                text: text.clone(),
                status: ChunkStatus::Pending,
                summary: None,
                attempts: 0,
                updated_at: now,
            })
            .collect();

        let job = SummaryJob {
            fingerprint: new_job.fingerprint.clone(),
            page_url: new_job.page_url,
            title: new_job.title,
            mode: new_job.mode,
            include_comments: new_job.include_comments,
            model: new_job.model,
            api_key: new_job.api_key,
            status,
            chunk_count: chunks.len() as i32,
            summary: None,
            error_message: None,
            worker_id: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        jobs.insert(
            new_job.fingerprint,
            StoredJob {
                job: job.clone(),
                chunks,
            },
        );

        Ok(job)
    }

    async fn update_chunk(
        &self,
        fingerprint: &str,
        chunk_index: i32,
        transition: ChunkTransition,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(stored) = jobs.get_mut(fingerprint) else {
            return Ok(());
        };
        let Some(chunk) = stored
            .chunks
            .iter_mut()
            .find(|c| c.chunk_index == chunk_index)
        else {
            return Ok(());
        };

        match transition {
            ChunkTransition::Summarized { summary } => {
                if chunk.summary.is_none() {
                    chunk.summary = Some(summary);
                    chunk.status = ChunkStatus::Summarized;
                    chunk.updated_at = Utc::now();
                }
            }
            ChunkTransition::AttemptFailed => {
                if chunk.status == ChunkStatus::Pending {
                    chunk.attempts += 1;
                    chunk.updated_at = Utc::now();
                }
            }
            ChunkTransition::Failed => {
                if chunk.status == ChunkStatus::Pending {
                    chunk.status = ChunkStatus::Failed;
                    chunk.updated_at = Utc::now();
                }
            }
        }

        Ok(())
    }

    async fn finalize(&self, fingerprint: &str, outcome: JobOutcome) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(stored) = jobs.get_mut(fingerprint) else {
            return Ok(());
        };

        if stored.job.status.is_terminal() {
            return Ok(());
        }

        match outcome {
            JobOutcome::Complete { summary } => {
                stored.job.status = SummaryJobStatus::Complete;
                stored.job.summary = Some(summary);
                stored.job.error_message = None;
            }
            JobOutcome::Failed { message } => {
                stored.job.status = SummaryJobStatus::Failed;
                stored.job.error_message = Some(message);
            }
        }
        stored.job.worker_id = None;
        stored.job.lease_expires_at = None;
        stored.job.updated_at = Utc::now();

        Ok(())
    }

    async fn acquire_lease(
        &self,
        fingerprint: &str,
        worker_id: &str,
        duration_ms: i64,
    ) -> Result<bool> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(stored) = jobs.get_mut(fingerprint) else {
            return Ok(false);
        };

        if stored.job.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        let available = match (&stored.job.worker_id, stored.job.lease_expires_at) {
            (None, _) => true,
            (Some(holder), _) if holder == worker_id => true,
            (_, Some(expires)) => expires < now,
            (Some(_), None) => false,
        };

        if available {
            stored.job.worker_id = Some(worker_id.to_string());
            stored.job.lease_expires_at = Some(now + Duration::milliseconds(duration_ms));
            stored.job.updated_at = now;
        }

        Ok(available)
    }

    async fn renew_lease(
        &self,
        fingerprint: &str,
        worker_id: &str,
        duration_ms: i64,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        if let Some(stored) = jobs.get_mut(fingerprint) {
            if stored.job.worker_id.as_deref() == Some(worker_id) {
                stored.job.lease_expires_at = Some(Utc::now() + Duration::milliseconds(duration_ms));
                stored.job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn release_lease(&self, fingerprint: &str, worker_id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        if let Some(stored) = jobs.get_mut(fingerprint) {
            if stored.job.worker_id.as_deref() == Some(worker_id) {
                stored.job.worker_id = None;
                stored.job.lease_expires_at = None;
                stored.job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn begin_aggregation(&self, fingerprint: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(stored) = jobs.get_mut(fingerprint) else {
            return Ok(false);
        };

        if stored.job.status == SummaryJobStatus::Summarizing {
            stored.job.status = SummaryJobStatus::Aggregating;
            stored.job.updated_at = Utc::now();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
