//! Integration tests for the Postgres summary store.
//!
//! Everything here is keyed by fingerprint, so tests run safely in
//! parallel against the shared test database as long as each test uses
//! its own fingerprints.

mod common;

use crate::common::TestHarness;
use server_core::summarize::{
    ChunkStatus, ChunkTransition, JobOutcome, NewSummaryJob, PostgresSummaryStore, SummarizeError,
    SummaryJobStatus, SummaryMode, SummaryStore,
};
use test_context::test_context;
use uuid::Uuid;

fn unique_fingerprint(label: &str) -> String {
    format!("{}-{}", label, Uuid::new_v4().simple())
}

fn new_job(fingerprint: &str, chunks: &[&str]) -> NewSummaryJob {
    NewSummaryJob {
        fingerprint: fingerprint.to_string(),
        page_url: "https://example.com/article".to_string(),
        title: Some("Example Article".to_string()),
        mode: SummaryMode::Standard,
        include_comments: false,
        model: "claude-3-7-sonnet-latest".to_string(),
        api_key: "sk-ant-test".to_string(),
        chunks: chunks.iter().map(|c| c.to_string()).collect(),
    }
}

// =============================================================================
// Creation and retrieval
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn create_and_get_round_trip(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("round-trip");

    let created = store
        .create(new_job(&fingerprint, &["First chunk.", "Second chunk."]))
        .await
        .unwrap();
    assert_eq!(created.status, SummaryJobStatus::Summarizing);
    assert_eq!(created.chunk_count, 2);

    let fetched = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(fetched.page_url, "https://example.com/article");
    assert_eq!(fetched.title.as_deref(), Some("Example Article"));
    assert_eq!(fetched.mode, SummaryMode::Standard);
    assert_eq!(fetched.model, "claude-3-7-sonnet-latest");
    assert!(fetched.summary.is_none());

    let chunks = store.get_chunks(&fingerprint).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].text, "First chunk.");
    assert_eq!(chunks[0].status, ChunkStatus::Pending);
    assert_eq!(chunks[0].attempts, 0);
    assert_eq!(chunks[1].chunk_index, 1);
    assert_eq!(chunks[1].text, "Second chunk.");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn empty_plan_lands_in_planning(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("empty-plan");

    let created = store.create(new_job(&fingerprint, &[])).await.unwrap();

    assert_eq!(created.status, SummaryJobStatus::Planning);
    assert_eq!(created.chunk_count, 0);
    assert!(store.get_chunks(&fingerprint).await.unwrap().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn duplicate_fingerprint_is_rejected(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("duplicate");

    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();
    let second = store.create(new_job(&fingerprint, &["Chunk."])).await;

    assert!(matches!(second, Err(SummarizeError::AlreadyExists(_))));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn missing_fingerprint_returns_none(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());

    let result = store.get(&unique_fingerprint("missing")).await.unwrap();

    assert!(result.is_none());
}

// =============================================================================
// Chunk transitions
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn chunk_summary_is_write_once(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("write-once");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    store
        .update_chunk(
            &fingerprint,
            0,
            ChunkTransition::Summarized {
                summary: "First writer wins.".to_string(),
            },
        )
        .await
        .unwrap();
    store
        .update_chunk(
            &fingerprint,
            0,
            ChunkTransition::Summarized {
                summary: "Second writer loses.".to_string(),
            },
        )
        .await
        .unwrap();

    let chunks = store.get_chunks(&fingerprint).await.unwrap();
    assert_eq!(chunks[0].status, ChunkStatus::Summarized);
    assert_eq!(chunks[0].summary.as_deref(), Some("First writer wins."));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn attempt_bookkeeping_touches_only_pending_chunks(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("attempts");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    store
        .update_chunk(&fingerprint, 0, ChunkTransition::AttemptFailed)
        .await
        .unwrap();
    store
        .update_chunk(&fingerprint, 0, ChunkTransition::AttemptFailed)
        .await
        .unwrap();

    let chunks = store.get_chunks(&fingerprint).await.unwrap();
    assert_eq!(chunks[0].status, ChunkStatus::Pending);
    assert_eq!(chunks[0].attempts, 2);

    store
        .update_chunk(&fingerprint, 0, ChunkTransition::Failed)
        .await
        .unwrap();
    // Further attempts on a settled chunk change nothing.
    store
        .update_chunk(&fingerprint, 0, ChunkTransition::AttemptFailed)
        .await
        .unwrap();

    let chunks = store.get_chunks(&fingerprint).await.unwrap();
    assert_eq!(chunks[0].status, ChunkStatus::Failed);
    assert_eq!(chunks[0].attempts, 2);
}

// =============================================================================
// Finalization
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn finalize_is_idempotent(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("finalize");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    store
        .finalize(
            &fingerprint,
            JobOutcome::Complete {
                summary: "<div>The summary.</div>".to_string(),
            },
        )
        .await
        .unwrap();
    store
        .finalize(
            &fingerprint,
            JobOutcome::Failed {
                message: "a later failure must not overwrite".to_string(),
            },
        )
        .await
        .unwrap();

    let job = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(job.status, SummaryJobStatus::Complete);
    assert_eq!(job.summary.as_deref(), Some("<div>The summary.</div>"));
    assert!(job.error_message.is_none());
    assert!(job.worker_id.is_none());
    assert!(job.lease_expires_at.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn finalize_failed_records_message(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("finalize-failed");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    store
        .finalize(
            &fingerprint,
            JobOutcome::Failed {
                message: "All chunk summarizations failed".to_string(),
            },
        )
        .await
        .unwrap();

    let job = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(job.status, SummaryJobStatus::Failed);
    assert_eq!(
        job.error_message.as_deref(),
        Some("All chunk summarizations failed")
    );
    assert!(job.summary.is_none());
}

// =============================================================================
// Leases
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn lease_excludes_other_workers_until_released(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("lease");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    assert!(store.acquire_lease(&fingerprint, "w1", 60_000).await.unwrap());
    assert!(!store.acquire_lease(&fingerprint, "w2", 60_000).await.unwrap());
    // The holder can re-acquire to extend.
    assert!(store.acquire_lease(&fingerprint, "w1", 60_000).await.unwrap());

    store.release_lease(&fingerprint, "w1").await.unwrap();
    assert!(store.acquire_lease(&fingerprint, "w2", 60_000).await.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn expired_lease_can_be_taken_over(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("lease-expiry");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    assert!(store.acquire_lease(&fingerprint, "w1", 50).await.unwrap());
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    assert!(store.acquire_lease(&fingerprint, "w2", 60_000).await.unwrap());
    let job = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(job.worker_id.as_deref(), Some("w2"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn lease_operations_ignore_non_holders(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("lease-owner");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    assert!(store.acquire_lease(&fingerprint, "w1", 60_000).await.unwrap());

    // Renew and release by a non-holder leave the lease intact.
    store.renew_lease(&fingerprint, "w2", 60_000).await.unwrap();
    store.release_lease(&fingerprint, "w2").await.unwrap();

    let job = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(job.worker_id.as_deref(), Some("w1"));
    assert!(!store.acquire_lease(&fingerprint, "w3", 60_000).await.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn terminal_jobs_are_never_leased(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("lease-terminal");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();
    store
        .finalize(
            &fingerprint,
            JobOutcome::Failed {
                message: "done".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(!store.acquire_lease(&fingerprint, "w1", 60_000).await.unwrap());
}

// =============================================================================
// Aggregation handoff
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn begin_aggregation_has_a_single_winner(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("aggregation");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();

    assert!(store.begin_aggregation(&fingerprint).await.unwrap());
    assert!(!store.begin_aggregation(&fingerprint).await.unwrap());

    let job = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(job.status, SummaryJobStatus::Aggregating);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn begin_aggregation_skips_terminal_jobs(ctx: &TestHarness) {
    let store = PostgresSummaryStore::new(ctx.db_pool.clone());
    let fingerprint = unique_fingerprint("aggregation-terminal");
    store
        .create(new_job(&fingerprint, &["Chunk."]))
        .await
        .unwrap();
    store
        .finalize(
            &fingerprint,
            JobOutcome::Complete {
                summary: "done".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(!store.begin_aggregation(&fingerprint).await.unwrap());
}
