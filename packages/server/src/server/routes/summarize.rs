//! The summarize endpoint.
//!
//! One `PUT /summarize` route serves both submission and polling: the
//! request body is fingerprinted, so an identical body maps to the same
//! job and the handler answers with whatever state that job is in. New
//! content creates a job and gets a processing-family response; clients
//! repeat the same request until they receive the summary or a failure.

use axum::extract::rejection::JsonRejection;
use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::server::app::AppState;
use crate::summarize::{
    submit, PageSubmission, SummarizeError, SummaryJob, SummaryJobStatus, SummaryMode,
};

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub include_comments: Option<bool>,
    #[serde(default)]
    pub mode: Option<SummaryMode>,
}

/// Submit a page for summarization, or poll a job already submitted.
pub async fn summarize_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(request)) = payload else {
        return validation_failure("Invalid JSON in request body");
    };

    let Some(page_url) = request.page_url.filter(|url| !url.trim().is_empty()) else {
        return validation_failure("Missing required parameter: page_url");
    };

    let submission = PageSubmission {
        page_url,
        html_content: request.html_content.unwrap_or_default(),
        mode: request.mode.unwrap_or(SummaryMode::Standard),
        include_comments: request.include_comments.unwrap_or(false),
        api_key: request.api_key,
        model: request.model,
    };

    match submit(&state.server_deps, submission).await {
        Ok(job) => job_response(&state, job).await,
        Err(SummarizeError::Validation(message)) => validation_failure(&message),
        Err(error) => {
            tracing::error!(error = %error, "summarize request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "message": "Internal server error" })),
            )
        }
    }
}

/// Map a job's current state onto the wire contract.
async fn job_response(state: &AppState, job: SummaryJob) -> (StatusCode, Json<Value>) {
    match job.status {
        SummaryJobStatus::Complete => {
            let summary = job.summary.unwrap_or_default();
            (StatusCode::OK, Json(json!({ "summary": summary })))
        }
        SummaryJobStatus::Failed => {
            let message = job
                .error_message
                .unwrap_or_else(|| "Summarization failed".to_string());
            (
                StatusCode::OK,
                Json(json!({ "success": false, "message": message })),
            )
        }
        SummaryJobStatus::Planning => {
            (StatusCode::ACCEPTED, Json(json!({ "status": "processing" })))
        }
        SummaryJobStatus::Summarizing => {
            let mut body = json!({ "status": "summarizing" });
            if let Some(message) = progress_message(state, &job).await {
                body["message"] = Value::String(message);
            }
            (StatusCode::ACCEPTED, Json(body))
        }
        SummaryJobStatus::Aggregating => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "summarizing", "message": "creating meta summary" })),
        ),
    }
}

/// Stage detail for polls of a job mid-summarization.
async fn progress_message(state: &AppState, job: &SummaryJob) -> Option<String> {
    match state.server_deps.store.get_chunks(&job.fingerprint).await {
        Ok(chunks) if !chunks.is_empty() => {
            let total = chunks.len();
            let settled = chunks.iter().filter(|c| c.status.is_terminal()).count();
            let current = (settled + 1).min(total);
            Some(format!("summarizing chunk {} of {}", current, total))
        }
        Ok(_) => None,
        Err(error) => {
            tracing::warn!(error = %error, "failed to load chunk progress");
            None
        }
    }
}

fn validation_failure(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
}
