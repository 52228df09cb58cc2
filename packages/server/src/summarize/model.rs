//! Summary job and chunk records.
//!
//! A job is keyed by its fingerprint and owns an ordered set of chunks
//! whose texts are fixed at planning time. Only chunk status, summaries,
//! attempt counts and the job's own status/outcome change afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Summarization mode requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "summary_mode", rename_all = "snake_case")]
#[serde(rename_all = "kebab-case")]
pub enum SummaryMode {
    Standard,
    CriticalAnalysis,
}

impl Default for SummaryMode {
    fn default() -> Self {
        SummaryMode::Standard
    }
}

impl SummaryMode {
    /// Stable identifier used in fingerprints and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::Standard => "standard",
            SummaryMode::CriticalAnalysis => "critical_analysis",
        }
    }
}

/// Lifecycle status of a summary job.
///
/// "New" has no variant: a job that does not exist yet has no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "summary_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SummaryJobStatus {
    Planning,
    Summarizing,
    Aggregating,
    Complete,
    Failed,
}

impl SummaryJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SummaryJobStatus::Complete | SummaryJobStatus::Failed)
    }
}

/// Status of one chunk within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "summary_chunk_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Summarized,
    Failed,
}

impl ChunkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Summarized | ChunkStatus::Failed)
    }
}

/// A stored summary job.
#[derive(Debug, Clone, TypedBuilder, sqlx::FromRow)]
#[builder(field_defaults(setter(into)))]
pub struct SummaryJob {
    pub fingerprint: String,
    pub page_url: String,
    #[builder(default, setter(strip_option))]
    pub title: Option<String>,
    pub mode: SummaryMode,
    pub include_comments: bool,
    pub model: String,
    /// Per-request key, carried with the job so detached workers and
    /// continuations can complete it.
    pub api_key: String,
    pub status: SummaryJobStatus,
    pub chunk_count: i32,
    #[builder(default, setter(strip_option))]
    pub summary: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default)]
    pub worker_id: Option<String>,
    #[builder(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

/// One chunk of a job's planned input.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryChunk {
    pub fingerprint: String,
    pub chunk_index: i32,
    pub text: String,
    pub status: ChunkStatus,
    pub summary: Option<String>,
    pub attempts: i32,
    pub updated_at: DateTime<Utc>,
}

/// Input to `SummaryStore::create`: a fully planned job.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewSummaryJob {
    pub fingerprint: String,
    pub page_url: String,
    #[builder(default, setter(strip_option))]
    pub title: Option<String>,
    pub mode: SummaryMode,
    pub include_comments: bool,
    pub model: String,
    pub api_key: String,
    /// Ordered chunk texts from the planner. May be empty only for jobs
    /// created to record a planning-time failure.
    pub chunks: Vec<String>,
}

/// Per-chunk state transition applied by `SummaryStore::update_chunk`.
#[derive(Debug, Clone)]
pub enum ChunkTransition {
    /// Store the summary and mark the chunk done. Write-once: a chunk that
    /// already has a summary keeps it.
    Summarized { summary: String },
    /// A transient completion failure; bumps the attempt counter and leaves
    /// the chunk pending.
    AttemptFailed,
    /// The chunk is out of attempts or failed permanently.
    Failed,
}

/// Terminal outcome recorded by `SummaryStore::finalize`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Complete { summary: String },
    Failed { message: String },
}
