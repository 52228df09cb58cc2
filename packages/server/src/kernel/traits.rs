// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Naming convention: Base* for trait names (e.g., BaseCompletions)

use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// Completions Trait (Infrastructure - LLM completion calls)
// =============================================================================

/// Which transient failure interrupted a completion call.
///
/// Drives backoff selection: rate limits wait much longer than timeouts
/// or upstream overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    TimedOut,
    Overloaded,
}

/// Completion call failure, split by whether a later retry could succeed.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("transient completion failure: {message}")]
    Transient {
        kind: TransientKind,
        message: String,
    },

    #[error("completion failure: {0}")]
    Permanent(String),
}

impl CompletionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CompletionError::Transient { .. })
    }
}

/// One completion request. Everything the call needs travels with it;
/// implementations read nothing from ambient process state.
#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub api_key: String,
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait BaseCompletions: Send + Sync {
    /// Run one completion call: exactly one upstream request per invocation.
    async fn complete(&self, call: &CompletionCall) -> Result<String, CompletionError>;
}
