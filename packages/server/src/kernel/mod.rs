//! Kernel module - server infrastructure and dependencies.

pub mod ai;
pub mod deps;
pub mod extract;
pub mod jobs;
pub mod traits;

/// Claude 3.7 Sonnet, the default model for summarization and critical analysis.
pub const CLAUDE_3_7_SONNET: &str = "claude-3-7-sonnet-latest";

pub use ai::AnthropicCompletions;
pub use deps::ServerDeps;
pub use extract::{ExtractError, ExtractedPage, PageExtractor};
pub use jobs::{
    ClaimedJob, CommandMeta, EnqueueResult, ErrorKind, Job, JobQueue, JobQueueExt, JobRegistry,
    JobRunner, JobRunnerConfig, JobSpec, JobStatus, PostgresJobQueue, SharedJobRegistry,
};
pub use traits::*;
