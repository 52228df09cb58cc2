//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, put},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::jobs::{JobQueue, JobRegistry, JobRunner, PostgresJobQueue};
use crate::kernel::{AnthropicCompletions, PageExtractor, ServerDeps};
use crate::server::routes::{health_handler, summarize_handler};
use crate::summarize::{self, PostgresSummaryStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub server_deps: Arc<ServerDeps>,
}

/// Build the Axum application router and start the background job runner.
pub fn build_app(pool: PgPool, config: &Config) -> Router {
    let store = Arc::new(PostgresSummaryStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pool.clone()));
    let completions = Arc::new(AnthropicCompletions::new(config.anthropic_base_url.clone()));
    let extractor = Arc::new(PageExtractor::new());

    // Clone for the job runner before moving into ServerDeps
    let queue_for_runner = queue.clone();

    let server_deps = Arc::new(ServerDeps::new(
        pool.clone(),
        store,
        queue,
        completions,
        extractor,
        config.pipeline.clone(),
    ));

    // Create the job registry and register all job handlers
    let mut job_registry = JobRegistry::new();
    summarize::register_jobs(&mut job_registry);
    let job_registry = Arc::new(job_registry);

    // Spawn the job runner as a background task
    let runner = JobRunner::new(queue_for_runner, job_registry, server_deps.clone());
    tokio::spawn(async move {
        if let Err(e) = runner.run_until_shutdown().await {
            tracing::error!(error = %e, "Job runner exited with error");
        }
    });

    let app_state = AppState {
        db_pool: pool,
        server_deps,
    };

    // CORS: summarize requests come from browser extensions and arbitrary
    // page origins, so any origin may call the API.
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/summarize", put(summarize_handler))
        .route("/health", get(health_handler))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
