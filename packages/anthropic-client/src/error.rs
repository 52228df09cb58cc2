//! Error types for Anthropic client.

use thiserror::Error;

/// Result type for Anthropic client operations.
pub type Result<T> = std::result::Result<T, AnthropicError>;

/// Anthropic client errors.
#[derive(Debug, Error)]
pub enum AnthropicError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, DNS, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request deadline exceeded before a response arrived
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// API error (non-2xx response), with the HTTP status for classification
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AnthropicError {
    /// The API rejected the request because of rate limiting.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AnthropicError::Api { status: 429, .. })
    }

    /// The request timed out before completing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AnthropicError::Timeout(_))
    }

    /// Whether retrying the same request later could succeed.
    ///
    /// Rate limits, timeouts, connection failures, and server-side errors
    /// (including Anthropic's 529 overloaded status) are transient.
    /// Authentication and request-shape errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AnthropicError::Network(_) | AnthropicError::Timeout(_) => true,
            AnthropicError::Api { status, .. } => *status == 429 || *status >= 500,
            AnthropicError::Config(_) | AnthropicError::Parse(_) => false,
        }
    }
}
