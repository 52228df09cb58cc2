//! Job infrastructure for background command execution.
//!
//! This module provides the kernel-level infrastructure for job execution:
//! - [`PostgresJobQueue`] - Database-backed job queue
//! - [`JobRunner`] - Long-running service that claims and executes jobs
//! - [`JobRegistry`] - Maps job type strings to typed handlers
//! - [`Job`] - Job model with queue state and retry bookkeeping
//!
//! # Architecture
//!
//! ```text
//! Handler calls queue.enqueue(cmd)
//!     │
//!     └─► Serialize command, insert jobs row
//!             (idempotency key suppresses duplicates)
//!
//! JobRunner
//!     │
//!     ├─► Claim jobs (FOR UPDATE SKIP LOCKED, lease per worker)
//!     ├─► Deserialize command from JSON (JobRegistry)
//!     ├─► Execute handler with heartbeat
//!     └─► Mark succeeded/failed (retry via new row, dead letter at cap)
//! ```
//!
//! The queue knows nothing about what runs on it. The summarization
//! controller registers its handler through [`crate::summarize::register_jobs`]
//! and owns everything from there.

mod job;
mod queue;
mod registry;
mod runner;

pub use job::{ErrorKind, Job, JobStatus};
pub use queue::{
    ClaimedJob, CommandMeta, EnqueueResult, JobQueue, JobQueueExt, JobSpec, PostgresJobQueue,
};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
