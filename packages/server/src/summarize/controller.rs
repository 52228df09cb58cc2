//! Job lifecycle control for the summarization pipeline.
//!
//! `submit` is the synchronous half: it fingerprints the request, plans
//! chunks, persists the job, and enqueues the first background pass.
//! `process_pass` is the asynchronous half: under a lease it summarizes
//! pending chunks inside a wall-clock budget, hands unfinished work to a
//! continuation pass, and aggregates once every chunk is settled.
//!
//! Passes are numbered so each continuation carries a fresh idempotency
//! key: racing workers can both decide "schedule pass N+1" and the queue
//! still creates exactly one row for it.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::utils::fingerprint::job_fingerprint;
use crate::config::PipelineConfig;
use crate::kernel::jobs::{CommandMeta, JobQueueExt, JobRegistry};
use crate::kernel::traits::TransientKind;
use crate::kernel::ServerDeps;
use crate::summarize::aggregate::aggregate;
use crate::summarize::chunking::plan_chunks;
use crate::summarize::error::{Result, SummarizeError};
use crate::summarize::model::{
    ChunkStatus, ChunkTransition, JobOutcome, NewSummaryJob, SummaryChunk, SummaryJob,
    SummaryJobStatus, SummaryMode,
};
use crate::summarize::summarizer::summarize_chunk;

// ============================================================================
// Work queue command
// ============================================================================

/// One background pass over a summary job's pending chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeCommand {
    pub fingerprint: String,
    /// Pass number, starting at 0. Continuations bump it so their
    /// idempotency keys never collide with the pass that scheduled them.
    pub pass: u32,
}

impl SummarizeCommand {
    pub const JOB_TYPE: &'static str = "summarize_chunks";
}

impl CommandMeta for SummarizeCommand {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("summarize:{}:{}", self.fingerprint, self.pass))
    }
}

/// Wire up job handlers for the summarization domain.
pub fn register_jobs(registry: &mut JobRegistry) {
    registry.register::<SummarizeCommand, _, _>(SummarizeCommand::JOB_TYPE, |command, deps| {
        async move {
            process_pass(&deps, &command.fingerprint, command.pass)
                .await
                .map_err(Into::into)
        }
    });
}

// ============================================================================
// Submission
// ============================================================================

/// A validated summarize request, ready for planning.
#[derive(Debug, Clone)]
pub struct PageSubmission {
    pub page_url: String,
    pub html_content: String,
    pub mode: SummaryMode,
    pub include_comments: bool,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Accept a summarize request: return the stored job for this content,
/// creating and kicking it off when the fingerprint is new.
///
/// Identical submissions land on the same fingerprint, so a client polling
/// with the same body gets the current state of the job it started. Polls
/// of an in-flight job also re-enqueue the kickoff pass, which revives jobs
/// whose background work was lost; the queue's idempotency key keeps this
/// from piling up while a pass is still pending.
pub async fn submit(deps: &ServerDeps, submission: PageSubmission) -> Result<SummaryJob> {
    if submission.html_content.trim().is_empty() {
        return Err(SummarizeError::Validation(
            "Missing required parameter: html_content".to_string(),
        ));
    }

    let mode = submission.mode;
    let fingerprint = job_fingerprint(
        &submission.html_content,
        mode.as_str(),
        submission.include_comments,
    );

    if let Some(job) = deps.store.get(&fingerprint).await? {
        if !job.status.is_terminal() {
            let command = SummarizeCommand {
                fingerprint: fingerprint.clone(),
                pass: 0,
            };
            if let Err(error) = deps.queue.enqueue(command).await {
                warn!(
                    fingerprint = %fingerprint,
                    error = %error,
                    "failed to re-enqueue summarize pass on poll"
                );
            }
        }
        debug!(
            fingerprint = %fingerprint,
            status = ?job.status,
            "returning existing job for fingerprint"
        );
        return Ok(job);
    }

    let Some(api_key) = submission
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
    else {
        return Err(SummarizeError::Validation(
            "API key required for summarization".to_string(),
        ));
    };
    let model = submission
        .model
        .clone()
        .unwrap_or_else(|| deps.pipeline.default_model.clone());

    let page = match deps.extractor.extract(
        &submission.html_content,
        &submission.page_url,
        submission.include_comments,
    ) {
        Ok(page) => page,
        Err(error) => {
            info!(
                fingerprint = %fingerprint,
                page_url = %submission.page_url,
                "page has no readable content, recording failed job"
            );
            return record_planning_failure(
                deps,
                &fingerprint,
                &submission,
                &model,
                &api_key,
                error.to_string(),
            )
            .await;
        }
    };

    let chunks = match plan_chunks(&page.text, deps.pipeline.max_chunk_chars) {
        Ok(chunks) => chunks,
        Err(error) => {
            return record_planning_failure(
                deps,
                &fingerprint,
                &submission,
                &model,
                &api_key,
                error.to_string(),
            )
            .await;
        }
    };

    let new_job = NewSummaryJob {
        fingerprint: fingerprint.clone(),
        page_url: submission.page_url.clone(),
        title: page.title.clone(),
        mode,
        include_comments: submission.include_comments,
        model,
        api_key,
        chunks,
    };

    let job = match deps.store.create(new_job).await {
        Ok(job) => job,
        Err(SummarizeError::AlreadyExists(_)) => {
            // Lost a race with an identical submission; treat ours as a poll.
            return deps
                .store
                .get(&fingerprint)
                .await?
                .ok_or_else(|| SummarizeError::NotFound(fingerprint.clone()));
        }
        Err(error) => return Err(error),
    };

    let command = SummarizeCommand {
        fingerprint: fingerprint.clone(),
        pass: 0,
    };
    deps.queue
        .enqueue(command)
        .await
        .map_err(|error| SummarizeError::Queue(error.to_string()))?;

    info!(
        fingerprint = %fingerprint,
        page_url = %job.page_url,
        chunk_count = job.chunk_count,
        mode = mode.as_str(),
        "accepted summarize job"
    );
    Ok(job)
}

/// Persist a job that failed before any chunk existed, so later polls of
/// the same content see the failure instead of re-running extraction.
async fn record_planning_failure(
    deps: &ServerDeps,
    fingerprint: &str,
    submission: &PageSubmission,
    model: &str,
    api_key: &str,
    message: String,
) -> Result<SummaryJob> {
    let new_job = NewSummaryJob {
        fingerprint: fingerprint.to_string(),
        page_url: submission.page_url.clone(),
        title: None,
        mode: submission.mode,
        include_comments: submission.include_comments,
        model: model.to_string(),
        api_key: api_key.to_string(),
        chunks: Vec::new(),
    };

    match deps.store.create(new_job).await {
        Ok(_) | Err(SummarizeError::AlreadyExists(_)) => {}
        Err(error) => return Err(error),
    }
    deps.store
        .finalize(fingerprint, JobOutcome::Failed { message })
        .await?;

    deps.store
        .get(fingerprint)
        .await?
        .ok_or_else(|| SummarizeError::NotFound(fingerprint.to_string()))
}

// ============================================================================
// Background passes
// ============================================================================

/// Run one budgeted pass over a job.
///
/// Skips quietly when the job is gone, already terminal, or leased to
/// another worker. Otherwise summarizes pending chunks in index order
/// until they are all settled or the budget runs out, then either
/// schedules a continuation or aggregates and finalizes.
pub async fn process_pass(deps: &ServerDeps, fingerprint: &str, pass: u32) -> Result<()> {
    let Some(job) = deps.store.get(fingerprint).await? else {
        warn!(fingerprint = %fingerprint, pass, "summarize pass for unknown fingerprint, skipping");
        return Ok(());
    };

    if job.status.is_terminal() {
        debug!(
            fingerprint = %fingerprint,
            pass,
            status = ?job.status,
            "job already terminal, nothing to do"
        );
        return Ok(());
    }

    let worker_id = format!("summarizer-{}", Uuid::new_v4());
    let lease_ms = deps.pipeline.lease_duration_ms;
    if !deps.store.acquire_lease(fingerprint, &worker_id, lease_ms).await? {
        debug!(fingerprint = %fingerprint, pass, "lease held by another worker, skipping pass");
        return Ok(());
    }

    let deadline = pass_deadline(&deps.pipeline);
    let result = run_pass(deps, &job, &worker_id, pass, deadline).await;

    if let Err(error) = deps.store.release_lease(fingerprint, &worker_id).await {
        warn!(fingerprint = %fingerprint, error = %error, "failed to release job lease");
    }

    result
}

/// When this pass must stop doing chunk work and hand off.
fn pass_deadline(pipeline: &PipelineConfig) -> Instant {
    let usable = pipeline.time_budget_ms.saturating_sub(pipeline.budget_margin_ms);
    Instant::now() + Duration::from_millis(usable)
}

async fn run_pass(
    deps: &ServerDeps,
    job: &SummaryJob,
    worker_id: &str,
    pass: u32,
    deadline: Instant,
) -> Result<()> {
    let fingerprint = job.fingerprint.as_str();
    let chunks = deps.store.get_chunks(fingerprint).await?;

    // A job with no chunks is a planning-failure record whose finalize never
    // landed. Close it out so polls stop seeing it in flight.
    if chunks.is_empty() {
        deps.store
            .finalize(
                fingerprint,
                JobOutcome::Failed {
                    message: "No readable content found in page".to_string(),
                },
            )
            .await?;
        return Ok(());
    }

    let total = chunks.len();
    for chunk in chunks.iter().filter(|c| c.status == ChunkStatus::Pending) {
        match summarize_with_retries(deps, job, chunk, total, deadline).await? {
            ChunkOutcome::Settled => {
                deps.store
                    .renew_lease(fingerprint, worker_id, deps.pipeline.lease_duration_ms)
                    .await?;
            }
            ChunkOutcome::OutOfBudget => {
                schedule_continuation(deps, fingerprint, pass, None).await?;
                return Ok(());
            }
            ChunkOutcome::Backoff(wait) => {
                schedule_continuation(deps, fingerprint, pass, Some(wait)).await?;
                return Ok(());
            }
        }
    }

    // Every chunk is settled. Aggregation still wants budget for its own
    // completion call; push it to a fresh pass if this one is spent.
    if Instant::now() >= deadline {
        schedule_continuation(deps, fingerprint, pass, None).await?;
        return Ok(());
    }

    let chunks = deps.store.get_chunks(fingerprint).await?;
    if !chunks.iter().any(|c| c.status == ChunkStatus::Summarized) {
        info!(fingerprint = %fingerprint, "every chunk failed, failing job");
        deps.store
            .finalize(
                fingerprint,
                JobOutcome::Failed {
                    message: "All chunk summarizations failed".to_string(),
                },
            )
            .await?;
        return Ok(());
    }

    if !deps.store.begin_aggregation(fingerprint).await? {
        // Lost the transition while holding the lease: either the job just
        // went terminal, or a previous holder died mid-aggregation and the
        // stale aggregating state is now ours to finish.
        match deps.store.get(fingerprint).await? {
            Some(current) if current.status == SummaryJobStatus::Aggregating => {
                debug!(fingerprint = %fingerprint, "resuming aggregation left by an expired lease");
            }
            _ => return Ok(()),
        }
    }

    let outcome = match aggregate(deps.completions.as_ref(), job, &chunks).await {
        Ok(summary) => JobOutcome::Complete {
            summary: summary.into_html(),
        },
        Err(first) => {
            warn!(fingerprint = %fingerprint, error = %first, "aggregation failed, retrying once");
            match aggregate(deps.completions.as_ref(), job, &chunks).await {
                Ok(summary) => JobOutcome::Complete {
                    summary: summary.into_html(),
                },
                Err(second) => {
                    error!(fingerprint = %fingerprint, error = %second, "aggregation failed twice, failing job");
                    JobOutcome::Failed {
                        message: second.to_string(),
                    }
                }
            }
        }
    };

    let failed = matches!(outcome, JobOutcome::Failed { .. });
    deps.store.finalize(fingerprint, outcome).await?;
    if failed {
        warn!(fingerprint = %fingerprint, "summarize job failed");
    } else {
        info!(fingerprint = %fingerprint, "summarize job complete");
    }
    Ok(())
}

/// How one chunk's turn at the summarizer ended.
enum ChunkOutcome {
    /// Summarized or failed; the pass moves on.
    Settled,
    /// The budget ran out before an attempt could start.
    OutOfBudget,
    /// A backoff wait would cross the deadline; continue after the wait.
    Backoff(Duration),
}

/// Summarize one chunk, retrying transient failures with backoff until the
/// chunk settles or the pass deadline gets in the way.
async fn summarize_with_retries(
    deps: &ServerDeps,
    job: &SummaryJob,
    chunk: &SummaryChunk,
    total: usize,
    deadline: Instant,
) -> Result<ChunkOutcome> {
    let fingerprint = job.fingerprint.as_str();
    let mut attempts = chunk.attempts;

    loop {
        if Instant::now() >= deadline {
            return Ok(ChunkOutcome::OutOfBudget);
        }

        info!(
            fingerprint = %fingerprint,
            chunk = chunk.chunk_index,
            total,
            attempt = attempts + 1,
            "summarizing chunk"
        );

        match summarize_chunk(deps.completions.as_ref(), job, &chunk.text).await {
            Ok(summary) => {
                deps.store
                    .update_chunk(
                        fingerprint,
                        chunk.chunk_index,
                        ChunkTransition::Summarized { summary },
                    )
                    .await?;
                return Ok(ChunkOutcome::Settled);
            }
            Err(SummarizeError::TransientCompletion { kind, message }) => {
                deps.store
                    .update_chunk(fingerprint, chunk.chunk_index, ChunkTransition::AttemptFailed)
                    .await?;
                attempts += 1;
                if attempts >= deps.pipeline.max_chunk_attempts {
                    warn!(
                        fingerprint = %fingerprint,
                        chunk = chunk.chunk_index,
                        attempts,
                        error = %message,
                        "chunk out of attempts, marking failed"
                    );
                    deps.store
                        .update_chunk(fingerprint, chunk.chunk_index, ChunkTransition::Failed)
                        .await?;
                    return Ok(ChunkOutcome::Settled);
                }

                let wait = backoff_for(&deps.pipeline, kind);
                warn!(
                    fingerprint = %fingerprint,
                    chunk = chunk.chunk_index,
                    attempts,
                    backoff_ms = wait.as_millis() as u64,
                    error = %message,
                    "transient completion failure, backing off"
                );
                if Instant::now() + wait >= deadline {
                    return Ok(ChunkOutcome::Backoff(wait));
                }
                sleep(wait).await;
            }
            Err(SummarizeError::PermanentCompletion(message)) => {
                warn!(
                    fingerprint = %fingerprint,
                    chunk = chunk.chunk_index,
                    error = %message,
                    "permanent completion failure, marking chunk failed"
                );
                deps.store
                    .update_chunk(fingerprint, chunk.chunk_index, ChunkTransition::Failed)
                    .await?;
                return Ok(ChunkOutcome::Settled);
            }
            Err(other) => return Err(other),
        }
    }
}

fn backoff_for(pipeline: &PipelineConfig, kind: TransientKind) -> Duration {
    let ms = match kind {
        TransientKind::RateLimited => pipeline.rate_limit_backoff_ms,
        TransientKind::TimedOut | TransientKind::Overloaded => pipeline.retry_backoff_ms,
    };
    Duration::from_millis(ms)
}

/// Enqueue the next pass, optionally delayed past a backoff wait. The
/// pass-scoped idempotency key means racing callers create one row.
async fn schedule_continuation(
    deps: &ServerDeps,
    fingerprint: &str,
    pass: u32,
    delay: Option<Duration>,
) -> Result<()> {
    let command = SummarizeCommand {
        fingerprint: fingerprint.to_string(),
        pass: pass + 1,
    };
    let result = match delay {
        Some(wait) => {
            let run_at = Utc::now() + chrono::Duration::milliseconds(wait.as_millis() as i64);
            deps.queue.schedule(command, run_at).await
        }
        None => deps.queue.enqueue(command).await,
    }
    .map_err(|error| SummarizeError::Queue(error.to_string()))?;

    info!(
        fingerprint = %fingerprint,
        next_pass = pass + 1,
        deduplicated = !result.is_created(),
        "scheduled continuation pass"
    );
    Ok(())
}
