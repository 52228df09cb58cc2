//! Aggregation of chunk summaries into the final document.
//!
//! Runs exactly once per job, after every chunk reaches a terminal state.
//! Standard mode makes one meta-summary completion call over the labeled
//! chunk summaries; critical analysis stitches the per-segment HTML
//! fragments with no further calls. A job where only some chunks failed
//! still produces output, annotated with the unavailable count.

use tracing::info;

use crate::kernel::traits::BaseCompletions;
use crate::summarize::error::{Result, SummarizeError};
use crate::summarize::model::{ChunkStatus, SummaryChunk, SummaryJob, SummaryMode};
use crate::summarize::prompts::segment_label;
use crate::summarize::summarizer::meta_call;

/// Final rendered output, tagged by how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatedSummary {
    /// Standard mode: an executive meta-summary over detailed chunk
    /// summaries, or a single chunk's own HTML.
    Unified { html: String },
    /// Critical analysis: labeled per-segment fragments, no meta pass.
    SegmentedAnalysis { html: String },
}

impl AggregatedSummary {
    pub fn into_html(self) -> String {
        match self {
            AggregatedSummary::Unified { html } => html,
            AggregatedSummary::SegmentedAnalysis { html } => html,
        }
    }
}

/// Combine terminal chunk states into the final summary document.
///
/// Callers must ensure every chunk is terminal and at least one chunk
/// summarized; an all-failed job never reaches aggregation.
pub async fn aggregate(
    completions: &dyn BaseCompletions,
    job: &SummaryJob,
    chunks: &[SummaryChunk],
) -> Result<AggregatedSummary> {
    let summarized: Vec<(i32, &str)> = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Summarized)
        .filter_map(|c| c.summary.as_deref().map(|s| (c.chunk_index, s)))
        .collect();

    if summarized.is_empty() {
        return Err(SummarizeError::Aggregation(
            "no summarized chunks to aggregate".to_string(),
        ));
    }

    let failed = chunks
        .iter()
        .filter(|c| c.status == ChunkStatus::Failed)
        .count();
    let annotation = (failed > 0).then(|| {
        format!(
            "<p><em>{} of {} segments could not be summarized.</em></p>",
            failed,
            chunks.len()
        )
    });

    // A single-chunk plan was summarized straight to HTML; pass it through.
    if job.chunk_count == 1 {
        let html = summarized[0].1.to_string();
        return Ok(match job.mode {
            SummaryMode::Standard => AggregatedSummary::Unified { html },
            SummaryMode::CriticalAnalysis => AggregatedSummary::SegmentedAnalysis { html },
        });
    }

    match job.mode {
        SummaryMode::CriticalAnalysis => {
            let mut sections: Vec<String> = summarized
                .iter()
                .map(|(index, summary)| {
                    format!("<h2>Segment {} Analysis</h2>\n{}", index + 1, summary)
                })
                .collect();
            if let Some(note) = annotation {
                sections.push(note);
            }

            info!(
                fingerprint = %job.fingerprint,
                segments = summarized.len(),
                failed = failed,
                "combined critical analysis segments"
            );

            Ok(AggregatedSummary::SegmentedAnalysis {
                html: format!("<div>\n{}\n</div>", sections.join("\n\n")),
            })
        }
        SummaryMode::Standard => {
            let labeled: Vec<String> = summarized
                .iter()
                .map(|(index, summary)| segment_label(*index as usize, summary))
                .collect();
            let combined = labeled.join("\n\n");

            let meta = completions
                .complete(&meta_call(job, &combined))
                .await
                .map_err(|e| SummarizeError::Aggregation(e.to_string()))?;

            info!(
                fingerprint = %job.fingerprint,
                segments = summarized.len(),
                failed = failed,
                "created meta summary"
            );

            let mut html = format!(
                "<div><h1>Executive Summary</h1>{}<h1>Detailed Summaries</h1>{}",
                meta,
                combined.replace('\n', "<br>")
            );
            if let Some(note) = annotation {
                html.push_str(&note);
            }
            html.push_str("</div>");

            Ok(AggregatedSummary::Unified { html })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::summarize::model::SummaryJobStatus;
    use crate::testing::MockCompletions;

    fn job_with(mode: SummaryMode, chunk_count: i32) -> SummaryJob {
        SummaryJob::builder()
            .fingerprint("fp")
            .page_url("https://example.com/a")
            .mode(mode)
            .include_comments(false)
            .model("claude-3-7-sonnet-latest")
            .api_key("sk-test")
            .status(SummaryJobStatus::Aggregating)
            .chunk_count(chunk_count)
            .build()
    }

    fn chunk(index: i32, status: ChunkStatus, summary: Option<&str>) -> SummaryChunk {
        SummaryChunk {
            fingerprint: "fp".to_string(),
            chunk_index: index,
            text: format!("chunk {} text", index),
            status,
            summary: summary.map(|s| s.to_string()),
            attempts: 1,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn single_chunk_passes_through_without_calls() {
        let mock = MockCompletions::new();
        let job = job_with(SummaryMode::Standard, 1);
        let chunks = vec![chunk(0, ChunkStatus::Summarized, Some("<div>whole page</div>"))];

        let result = aggregate(&mock, &job, &chunks).await.unwrap();
        assert_eq!(
            result,
            AggregatedSummary::Unified {
                html: "<div>whole page</div>".to_string()
            }
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn standard_multi_chunk_makes_one_meta_call() {
        let mock = MockCompletions::new().with_ok("<div>the meta summary</div>");
        let job = job_with(SummaryMode::Standard, 2);
        let chunks = vec![
            chunk(0, ChunkStatus::Summarized, Some("First part.")),
            chunk(1, ChunkStatus::Summarized, Some("Second part.")),
        ];

        let html = aggregate(&mock, &job, &chunks).await.unwrap().into_html();

        assert!(html.starts_with("<div><h1>Executive Summary</h1><div>the meta summary</div>"));
        assert!(html.contains("<h1>Detailed Summaries</h1>"));
        assert!(html.contains("--- Segment 1 ---<br><br>First part."));
        assert!(html.contains("--- Segment 2 ---<br><br>Second part."));
        assert!(html.ends_with("</div>"));

        assert_eq!(mock.call_count(), 1);
        let call = &mock.calls()[0];
        assert!(call.prompt.contains("--- Segment 1 ---"));
        assert!(call.prompt.contains("Second part."));
    }

    #[tokio::test]
    async fn critical_analysis_stitches_without_calls() {
        let mock = MockCompletions::new();
        let job = job_with(SummaryMode::CriticalAnalysis, 2);
        let chunks = vec![
            chunk(0, ChunkStatus::Summarized, Some("<div>analysis one</div>")),
            chunk(1, ChunkStatus::Summarized, Some("<div>analysis two</div>")),
        ];

        let result = aggregate(&mock, &job, &chunks).await.unwrap();
        let html = match result {
            AggregatedSummary::SegmentedAnalysis { ref html } => html.clone(),
            other => panic!("expected segmented output, got {:?}", other),
        };

        assert!(html.starts_with("<div>\n<h2>Segment 1 Analysis</h2>\n<div>analysis one</div>"));
        assert!(html.contains("<h2>Segment 2 Analysis</h2>"));
        assert!(html.ends_with("\n</div>"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn partial_failure_is_annotated_and_keeps_segment_numbers() {
        let mock = MockCompletions::new().with_ok("<div>meta</div>");
        let job = job_with(SummaryMode::Standard, 3);
        let chunks = vec![
            chunk(0, ChunkStatus::Summarized, Some("First part.")),
            chunk(1, ChunkStatus::Failed, None),
            chunk(2, ChunkStatus::Summarized, Some("Third part.")),
        ];

        let html = aggregate(&mock, &job, &chunks).await.unwrap().into_html();

        assert!(html.contains("1 of 3 segments could not be summarized."));
        // Surviving chunks keep their original positions
        assert!(html.contains("--- Segment 1 ---"));
        assert!(!html.contains("--- Segment 2 ---"));
        assert!(html.contains("--- Segment 3 ---"));
    }

    #[tokio::test]
    async fn critical_partial_failure_is_annotated() {
        let mock = MockCompletions::new();
        let job = job_with(SummaryMode::CriticalAnalysis, 2);
        let chunks = vec![
            chunk(0, ChunkStatus::Summarized, Some("<div>analysis one</div>")),
            chunk(1, ChunkStatus::Failed, None),
        ];

        let html = aggregate(&mock, &job, &chunks).await.unwrap().into_html();
        assert!(html.contains("1 of 2 segments could not be summarized."));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn all_failed_chunks_is_an_error() {
        let mock = MockCompletions::new();
        let job = job_with(SummaryMode::Standard, 2);
        let chunks = vec![
            chunk(0, ChunkStatus::Failed, None),
            chunk(1, ChunkStatus::Failed, None),
        ];

        let result = aggregate(&mock, &job, &chunks).await;
        assert!(matches!(result, Err(SummarizeError::Aggregation(_))));
    }

    #[tokio::test]
    async fn meta_call_failure_maps_to_aggregation_error() {
        use crate::kernel::traits::TransientKind;

        let mock = MockCompletions::new().with_transient(TransientKind::TimedOut);
        let job = job_with(SummaryMode::Standard, 2);
        let chunks = vec![
            chunk(0, ChunkStatus::Summarized, Some("First part.")),
            chunk(1, ChunkStatus::Summarized, Some("Second part.")),
        ];

        let result = aggregate(&mock, &job, &chunks).await;
        assert!(matches!(result, Err(SummarizeError::Aggregation(_))));
    }
}
