//! Background service that drains the job queue.
//!
//! A [`JobRunner`] claims due jobs, dispatches each one through the
//! [`JobRegistry`](super::JobRegistry), keeps the claim lease alive while
//! the handler runs, and settles the row as succeeded or failed. Retry and
//! dead letter decisions live in the queue's `mark_failed`; the runner only
//! classifies the error it saw.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::{ClaimedJob, JobQueue};
use super::registry::SharedJobRegistry;
use super::ErrorKind;
use crate::kernel::ServerDeps;

/// Tuning for the poll loop.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Jobs claimed per poll.
    pub batch_size: i64,
    /// Idle sleep when a poll finds nothing.
    pub poll_interval: Duration,
    /// Lease extension cadence while a handler runs. Must stay well below
    /// the queue lease duration or another runner steals the job mid-flight.
    pub heartbeat_interval: Duration,
    /// Identity recorded on claimed rows.
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(20),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

impl JobRunnerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

pub struct JobRunner {
    queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
    ) -> Self {
        Self::with_config(queue, registry, deps, JobRunnerConfig::default())
    }

    pub fn with_config(
        queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the loop after the batch in progress.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Poll for jobs until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            job_types = ?self.registry.registered_types(),
            "job runner started"
        );

        while !self.shutting_down() {
            match self
                .queue
                .claim(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(batch) if batch.is_empty() => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Ok(batch) => {
                    debug!(count = batch.len(), "claimed batch");
                    for job in batch {
                        if self.shutting_down() {
                            break;
                        }
                        self.run_one(job).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "claim failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Execute one claimed job and settle its row.
    async fn run_one(&self, job: ClaimedJob) {
        let job_id = job.id;
        let job_type = job.command_type().to_string();
        debug!(job_id = %job_id, job_type = %job_type, "executing job");

        match self.execute_with_heartbeat(&job).await {
            Ok(()) => {
                info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = self.queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to record success");
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");
                let kind = classify_error(&e);
                if let Err(mark_err) = self.queue.mark_failed(job_id, &e.to_string(), kind).await {
                    error!(job_id = %job_id, error = %mark_err, "failed to record failure");
                }
            }
        }
    }

    /// Drive the handler while extending the claim lease on an interval.
    ///
    /// Summarization handlers legitimately run for minutes (model calls and
    /// backoff sleeps), far past a single claim lease.
    async fn execute_with_heartbeat(&self, job: &ClaimedJob) -> Result<()> {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        // The first tick fires immediately; consume it so extensions start
        // one interval from now.
        heartbeat.tick().await;

        let execute = self.registry.execute(job, self.deps.clone());
        tokio::pin!(execute);

        loop {
            tokio::select! {
                result = &mut execute => return result,
                _ = heartbeat.tick() => {
                    if let Err(e) = self.queue.heartbeat(job.id).await {
                        warn!(job_id = %job.id, error = %e, "lease extension failed");
                    }
                }
            }
        }
    }

    /// Run until Ctrl+C.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }
}

/// Decide whether a handler error is worth a queue retry.
///
/// Queue retries cover infrastructure faults. Handler-level outcomes such
/// as chunk attempt ceilings never surface here as errors, so anything that
/// does not look like bad input is treated as transient.
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    const PERMANENT_MARKERS: [&str; 7] = [
        "not found",
        "invalid",
        "permission denied",
        "unauthorized",
        "forbidden",
        "deserialize",
        "parse",
    ];

    let rendered = error.to_string().to_lowercase();
    if PERMANENT_MARKERS
        .iter()
        .any(|marker| rendered.contains(marker))
    {
        ErrorKind::NonRetryable
    } else {
        ErrorKind::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_heartbeats_inside_the_lease() {
        let config = JobRunnerConfig::default();
        assert!(config.worker_id.starts_with("runner-"));
        assert!(config.heartbeat_interval < Duration::from_secs(60));
    }

    #[test]
    fn test_with_worker_id_overrides_identity() {
        let config = JobRunnerConfig::with_worker_id("drain-1");
        assert_eq!(config.worker_id, "drain-1");
    }

    #[test]
    fn test_infrastructure_errors_retry() {
        let error = anyhow::anyhow!("connection reset by peer");
        assert_eq!(classify_error(&error), ErrorKind::Retryable);
    }

    #[test]
    fn test_bad_input_errors_do_not_retry() {
        let missing = anyhow::anyhow!("summary job not found");
        assert_eq!(classify_error(&missing), ErrorKind::NonRetryable);

        let garbled = anyhow::anyhow!("summarize_chunks payload did not deserialize");
        assert_eq!(classify_error(&garbled), ErrorKind::NonRetryable);
    }
}
