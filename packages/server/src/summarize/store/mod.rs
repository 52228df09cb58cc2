//! Persistence for summary jobs.
//!
//! One trait, two implementations: Postgres for production and an
//! in-memory store for tests and development. Both enforce the same
//! semantics: chunk texts are immutable after creation, chunk summaries
//! are write-once, and finalization is idempotent.

mod memory;
mod postgres;

pub use memory::MemorySummaryStore;
pub use postgres::PostgresSummaryStore;

use async_trait::async_trait;

use crate::summarize::error::Result;
use crate::summarize::model::{
    ChunkTransition, JobOutcome, NewSummaryJob, SummaryChunk, SummaryJob,
};

/// Storage for summary jobs, keyed by fingerprint.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Fetch a job by fingerprint.
    async fn get(&self, fingerprint: &str) -> Result<Option<SummaryJob>>;

    /// Fetch a job's chunks in index order.
    async fn get_chunks(&self, fingerprint: &str) -> Result<Vec<SummaryChunk>>;

    /// Persist a planned job with all chunks pending.
    ///
    /// A non-empty plan is stored in `summarizing`; an empty plan (used to
    /// record a planning-time failure) is stored in `planning` so the caller
    /// can finalize it. Creating a fingerprint that already exists fails
    /// with `AlreadyExists`.
    async fn create(&self, new_job: NewSummaryJob) -> Result<SummaryJob>;

    /// Apply a per-chunk transition atomically.
    ///
    /// `Summarized` is write-once: if the chunk already carries a summary
    /// the stored value wins and the call is a no-op. `AttemptFailed` and
    /// `Failed` only touch pending chunks.
    async fn update_chunk(
        &self,
        fingerprint: &str,
        chunk_index: i32,
        transition: ChunkTransition,
    ) -> Result<()>;

    /// Record the terminal outcome. Idempotent: once a job is terminal,
    /// later calls leave the stored outcome unchanged.
    async fn finalize(&self, fingerprint: &str, outcome: JobOutcome) -> Result<()>;

    /// Try to take the job lease.
    ///
    /// Succeeds when no lease exists, the existing lease has expired, or
    /// this worker already holds it (re-acquiring extends the expiry).
    /// Terminal jobs are never leased.
    async fn acquire_lease(
        &self,
        fingerprint: &str,
        worker_id: &str,
        duration_ms: i64,
    ) -> Result<bool>;

    /// Extend a held lease. A lease held by another worker is untouched.
    async fn renew_lease(&self, fingerprint: &str, worker_id: &str, duration_ms: i64)
        -> Result<()>;

    /// Drop a held lease so another worker can pick the job up immediately.
    async fn release_lease(&self, fingerprint: &str, worker_id: &str) -> Result<()>;

    /// Transition `summarizing` to `aggregating`, returning whether this
    /// caller won. At most one caller ever sees `true` per job, which keeps
    /// the aggregation pass single-shot.
    async fn begin_aggregation(&self, fingerprint: &str) -> Result<bool>;
}
