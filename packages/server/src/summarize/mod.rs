//! Webpage summarization pipeline.
//!
//! The flow runs in two halves. A request lands in
//! [`controller::submit`], which fingerprints the content, extracts and
//! chunks it, persists a job, and enqueues the first background pass.
//! The job runner then drives [`controller::process_pass`]: chunk
//! summaries with retry and budget handling, continuation passes when
//! time runs out, and a final aggregation into the stored summary.

pub mod aggregate;
pub mod chunking;
pub mod controller;
pub mod error;
pub mod model;
pub mod prompts;
pub mod store;
pub mod summarizer;

pub use controller::{process_pass, register_jobs, submit, PageSubmission, SummarizeCommand};
pub use error::{Result, SummarizeError};
pub use model::{
    ChunkStatus, ChunkTransition, JobOutcome, NewSummaryJob, SummaryChunk, SummaryJob,
    SummaryJobStatus, SummaryMode,
};
pub use store::{MemorySummaryStore, PostgresSummaryStore, SummaryStore};
