//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] hearth_llm::LlmError),

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The query was empty or otherwise unusable after sanitization.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Compaction error.
    #[error("Compaction error: {0}")]
    Compaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Maximum tool-loop iterations exceeded.
    #[error("Maximum iterations exceeded: {0}")]
    MaxIterations(u32),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create a tool error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create an invalid-query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a compaction error.
    pub fn compaction(msg: impl Into<String>) -> Self {
        Self::Compaction(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::tool("service call failed");
        assert!(err.to_string().contains("Tool error"));
        assert!(err.to_string().contains("service call failed"));
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: AgentError = hearth_llm::LlmError::provider("timeout").into();
        assert!(matches!(err, AgentError::Llm(_)));
    }
}
