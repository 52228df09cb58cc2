// AI implementation using the Anthropic Messages API
//
// This is the infrastructure implementation of BaseCompletions.
// Business logic (what to prompt for) lives in the summarize domain.

use anthropic_client::{AnthropicClient, AnthropicError, Message, MessageRequest};
use async_trait::async_trait;

use super::traits::{BaseCompletions, CompletionCall, CompletionError, TransientKind};

/// Anthropic implementation of completion calls.
///
/// Holds a configured client (base URL, shared connection pool); the API
/// key arrives with each call and is swapped in per request.
#[derive(Clone)]
pub struct AnthropicCompletions {
    client: AnthropicClient,
}

impl AnthropicCompletions {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = AnthropicClient::new(String::new()).with_base_url(base_url);
        Self { client }
    }
}

#[async_trait]
impl BaseCompletions for AnthropicCompletions {
    async fn complete(&self, call: &CompletionCall) -> Result<String, CompletionError> {
        let request = MessageRequest::new(&call.model)
            .system(&call.system)
            .message(Message::user(&call.prompt))
            .temperature(call.temperature)
            .max_tokens(call.max_tokens);

        let client = self.client.clone().with_api_key(&call.api_key);
        let response = client
            .create_message(request)
            .await
            .map_err(classify_client_error)?;

        Ok(response.text)
    }
}

/// Map a client error into the retry taxonomy.
fn classify_client_error(err: AnthropicError) -> CompletionError {
    if err.is_rate_limit() {
        return CompletionError::Transient {
            kind: TransientKind::RateLimited,
            message: err.to_string(),
        };
    }
    if err.is_timeout() {
        return CompletionError::Transient {
            kind: TransientKind::TimedOut,
            message: err.to_string(),
        };
    }
    if err.is_transient() {
        return CompletionError::Transient {
            kind: TransientKind::Overloaded,
            message: err.to_string(),
        };
    }
    CompletionError::Permanent(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_maps_to_rate_limited() {
        let err = AnthropicError::Api {
            status: 429,
            message: "rate_limit_error".into(),
        };
        match classify_client_error(err) {
            CompletionError::Transient { kind, .. } => {
                assert_eq!(kind, TransientKind::RateLimited)
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_maps_to_timed_out() {
        let err = AnthropicError::Timeout("deadline elapsed".into());
        match classify_client_error(err) {
            CompletionError::Transient { kind, .. } => assert_eq!(kind, TransientKind::TimedOut),
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_overloaded_maps_to_overloaded() {
        let err = AnthropicError::Api {
            status: 529,
            message: "overloaded_error".into(),
        };
        match classify_client_error(err) {
            CompletionError::Transient { kind, .. } => assert_eq!(kind, TransientKind::Overloaded),
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_error_is_permanent() {
        let err = AnthropicError::Api {
            status: 401,
            message: "authentication_error".into(),
        };
        assert!(!classify_client_error(err).is_transient());
    }

    #[test]
    fn test_network_error_is_transient() {
        let err = AnthropicError::Network("connection refused".into());
        assert!(classify_client_error(err).is_transient());
    }
}
