//! Per-chunk summarization calls.
//!
//! Exactly one completion call per chunk attempt. Chunk output is plain
//! text for standard multi-chunk jobs (the meta-summary pass renders the
//! final HTML) and an HTML fragment when chunk output reaches the client
//! unmodified: single-chunk jobs and critical analysis.

use crate::kernel::traits::{BaseCompletions, CompletionCall};
use crate::summarize::error::Result;
use crate::summarize::model::{SummaryJob, SummaryMode};
use crate::summarize::prompts::{
    meta_summary_prompt, CRITICAL_ANALYSIS_HTML_SYSTEM_PROMPT, CRITICAL_ANALYSIS_SYSTEM_PROMPT,
    CRITICAL_ANALYSIS_TEMPERATURE, HTML_OUTPUT_SUFFIX, MAX_COMPLETION_TOKENS,
    SUMMARY_SYSTEM_PROMPT, SUMMARY_TEMPERATURE,
};

/// Whether chunk summaries for this job should be HTML fragments.
pub fn wants_html_chunks(job: &SummaryJob) -> bool {
    job.chunk_count == 1 || job.mode == SummaryMode::CriticalAnalysis
}

/// System prompt for a summarization call.
pub fn system_prompt(mode: SummaryMode, html_output: bool) -> String {
    match (mode, html_output) {
        (SummaryMode::Standard, false) => SUMMARY_SYSTEM_PROMPT.to_string(),
        (SummaryMode::Standard, true) => format!("{SUMMARY_SYSTEM_PROMPT}{HTML_OUTPUT_SUFFIX}"),
        (SummaryMode::CriticalAnalysis, false) => CRITICAL_ANALYSIS_SYSTEM_PROMPT.to_string(),
        (SummaryMode::CriticalAnalysis, true) => CRITICAL_ANALYSIS_HTML_SYSTEM_PROMPT.to_string(),
    }
}

fn temperature(mode: SummaryMode) -> f32 {
    match mode {
        SummaryMode::Standard => SUMMARY_TEMPERATURE,
        SummaryMode::CriticalAnalysis => CRITICAL_ANALYSIS_TEMPERATURE,
    }
}

/// Build the completion call for one chunk of this job.
pub fn chunk_call(job: &SummaryJob, chunk_text: &str) -> CompletionCall {
    CompletionCall {
        api_key: job.api_key.clone(),
        model: job.model.clone(),
        system: system_prompt(job.mode, wants_html_chunks(job)),
        prompt: chunk_text.to_string(),
        temperature: temperature(job.mode),
        max_tokens: MAX_COMPLETION_TOKENS,
    }
}

/// Build the meta-summary call that unifies labeled chunk summaries.
///
/// Always a standard-style call with HTML output, regardless of job mode:
/// critical analysis never reaches this path.
pub fn meta_call(job: &SummaryJob, combined: &str) -> CompletionCall {
    CompletionCall {
        api_key: job.api_key.clone(),
        model: job.model.clone(),
        system: system_prompt(SummaryMode::Standard, true),
        prompt: meta_summary_prompt(combined),
        temperature: SUMMARY_TEMPERATURE,
        max_tokens: MAX_COMPLETION_TOKENS,
    }
}

/// Summarize one chunk with a single completion call.
pub async fn summarize_chunk(
    completions: &dyn BaseCompletions,
    job: &SummaryJob,
    chunk_text: &str,
) -> Result<String> {
    let summary = completions.complete(&chunk_call(job, chunk_text)).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::summarize::model::SummaryJobStatus;

    fn job_with(mode: SummaryMode, chunk_count: i32) -> SummaryJob {
        SummaryJob::builder()
            .fingerprint("fp")
            .page_url("https://example.com/a")
            .mode(mode)
            .include_comments(false)
            .model("claude-3-7-sonnet-latest")
            .api_key("sk-test")
            .status(SummaryJobStatus::Summarizing)
            .chunk_count(chunk_count)
            .build()
    }

    #[test]
    fn multi_chunk_standard_chunks_are_plain_text() {
        let job = job_with(SummaryMode::Standard, 3);
        assert!(!wants_html_chunks(&job));

        let call = chunk_call(&job, "chunk text");
        assert_eq!(call.system, SUMMARY_SYSTEM_PROMPT);
        assert_eq!(call.temperature, SUMMARY_TEMPERATURE);
    }

    #[test]
    fn single_chunk_gets_html_output() {
        let job = job_with(SummaryMode::Standard, 1);
        assert!(wants_html_chunks(&job));

        let call = chunk_call(&job, "chunk text");
        assert!(call.system.starts_with(SUMMARY_SYSTEM_PROMPT));
        assert!(call.system.ends_with(HTML_OUTPUT_SUFFIX));
    }

    #[test]
    fn critical_analysis_chunks_are_html_at_any_count() {
        let job = job_with(SummaryMode::CriticalAnalysis, 4);
        assert!(wants_html_chunks(&job));

        let call = chunk_call(&job, "chunk text");
        assert_eq!(call.system, CRITICAL_ANALYSIS_HTML_SYSTEM_PROMPT);
        assert_eq!(call.temperature, CRITICAL_ANALYSIS_TEMPERATURE);
    }

    #[test]
    fn chunk_call_carries_job_credentials() {
        let job = job_with(SummaryMode::Standard, 2);
        let call = chunk_call(&job, "text");
        assert_eq!(call.api_key, "sk-test");
        assert_eq!(call.model, "claude-3-7-sonnet-latest");
        assert_eq!(call.max_tokens, MAX_COMPLETION_TOKENS);
    }

    #[test]
    fn meta_call_is_standard_html_even_for_critical_jobs() {
        let job = job_with(SummaryMode::CriticalAnalysis, 3);
        let call = meta_call(&job, "--- Segment 1 ---\n\nsummary");
        assert!(call.system.starts_with(SUMMARY_SYSTEM_PROMPT));
        assert!(call.prompt.contains("--- Segment 1 ---"));
        assert_eq!(call.temperature, SUMMARY_TEMPERATURE);
    }
}
