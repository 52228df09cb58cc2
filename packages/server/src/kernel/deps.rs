//! Server dependencies for handlers (using traits for testability)
//!
//! This module provides the central dependency container used by request
//! handlers and background jobs. External services use trait abstractions
//! to enable testing.

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::kernel::extract::PageExtractor;
use crate::kernel::jobs::JobQueue;
use crate::kernel::traits::BaseCompletions;
use crate::summarize::SummaryStore;

/// Server dependencies accessible to handlers and jobs.
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    /// Summary job state, keyed by content fingerprint
    pub store: Arc<dyn SummaryStore>,
    /// Durable work queue for background passes
    pub queue: Arc<dyn JobQueue>,
    /// Completion backend for chunk and meta summaries. Callers pass the
    /// model and API key per-call; nothing ambient is read.
    pub completions: Arc<dyn BaseCompletions>,
    /// HTML-to-text extraction for submitted pages
    pub extractor: Arc<PageExtractor>,
    /// Tuning knobs for chunking, retries and time budgets
    pub pipeline: PipelineConfig,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        db_pool: PgPool,
        store: Arc<dyn SummaryStore>,
        queue: Arc<dyn JobQueue>,
        completions: Arc<dyn BaseCompletions>,
        extractor: Arc<PageExtractor>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            db_pool,
            store,
            queue,
            completions,
            extractor,
            pipeline,
        }
    }
}
