//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for provider operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider returned an error (HTTP failure, API error body, etc.).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider returned an empty or unusable response.
    #[error("empty response from provider '{0}'")]
    EmptyResponse(String),

    /// The provider does not implement streaming.
    #[error("provider '{0}' does not support streaming")]
    StreamingUnsupported(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LlmError::provider("rate limited");
        assert!(err.to_string().contains("provider error"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_streaming_unsupported_names_provider() {
        let err = LlmError::StreamingUnsupported("openai".to_string());
        assert!(err.to_string().contains("openai"));
    }
}
