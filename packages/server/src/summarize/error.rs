//! Typed errors for the summarization pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Wall-clock budget exhaustion
//! is deliberately absent: running out of time is a control-flow outcome
//! handled by the controller, not a failure.

use thiserror::Error;

use crate::kernel::traits::{CompletionError, TransientKind};

/// Result type for summarization operations.
pub type Result<T> = std::result::Result<T, SummarizeError>;

/// Errors that can occur during summarization operations.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Request failed validation; nothing was created
    #[error("{0}")]
    Validation(String),

    /// Readable text could not be extracted from the page
    #[error("content extraction failed: {0}")]
    Extraction(String),

    /// Planner input was empty or whitespace-only
    #[error("no readable content to summarize")]
    EmptyContent,

    /// Completion call failed in a way worth retrying
    #[error("transient completion failure: {message}")]
    TransientCompletion {
        kind: TransientKind,
        message: String,
    },

    /// Completion call failed in a way retrying cannot fix
    #[error("completion failure: {0}")]
    PermanentCompletion(String),

    /// Meta-summary generation failed
    #[error("aggregation failed: {0}")]
    Aggregation(String),

    /// A job already exists for this fingerprint
    #[error("job already exists: {0}")]
    AlreadyExists(String),

    /// No stored job for the fingerprint
    #[error("job not found: {0}")]
    NotFound(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Work queue operation failed
    #[error("queue error: {0}")]
    Queue(String),
}

impl SummarizeError {
    /// Backoff bucket for a transient completion failure, if this is one.
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            SummarizeError::TransientCompletion { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<CompletionError> for SummarizeError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Transient { kind, message } => {
                SummarizeError::TransientCompletion { kind, message }
            }
            CompletionError::Permanent(message) => SummarizeError::PermanentCompletion(message),
        }
    }
}
