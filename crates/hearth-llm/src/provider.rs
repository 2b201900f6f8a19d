//! Provider trait and streaming event types.
//!
//! Implementations of [`AiProvider`] connect to a concrete LLM service
//! (OpenAI-, Gemini- or Anthropic-style APIs). The core never talks HTTP
//! itself; it only consumes this trait.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{LlmError, Result};
use crate::types::CompletionRequest;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming types
// ─────────────────────────────────────────────────────────────────────────────

/// A streaming response from a provider.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent>> + Send + 'static>>;

/// Events emitted while a provider streams a response.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A text delta.
    Text {
        /// The text content.
        content: String,
    },
    /// A completed tool call, in the provider's native shape.
    ///
    /// Providers only emit this once the call is fully accumulated; the
    /// value is kept verbatim so prior turns can be replayed byte-exactly.
    ToolCall {
        /// The provider-native call object.
        call: serde_json::Value,
    },
    /// The provider reported an error mid-stream.
    Error {
        /// Error message.
        message: String,
    },
    /// The stream is complete.
    Done,
}

impl ProviderEvent {
    /// Returns true if this is the final event of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProviderEvent::Done | ProviderEvent::Error { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for LLM providers.
///
/// The minimal contract is [`get_response`](AiProvider::get_response);
/// streaming is optional and advertised via
/// [`supports_streaming`](AiProvider::supports_streaming). Retry/backoff
/// policy is the implementation's own concern — the core calls each method
/// exactly once per loop iteration.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Execute a completion request and return the full response text.
    async fn get_response(&self, request: CompletionRequest) -> Result<String>;

    /// Execute a completion request and return a stream of events.
    ///
    /// The default implementation reports streaming as unsupported so that
    /// simple providers stay one-method implementations.
    async fn get_response_stream(&self, _request: CompletionRequest) -> Result<EventStream> {
        Err(LlmError::StreamingUnsupported(self.name().to_string()))
    }

    /// Whether this provider accepts tool schemas on requests.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Whether [`get_response_stream`](AiProvider::get_response_stream) is
    /// implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Get the name of this provider.
    fn name(&self) -> &str;
}

/// A provider that can be shared across tasks.
pub type SharedProvider = Arc<dyn AiProvider>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    struct TextOnlyProvider;

    #[async_trait]
    impl AiProvider for TextOnlyProvider {
        async fn get_response(&self, _request: CompletionRequest) -> Result<String> {
            Ok("ok".to_string())
        }

        fn name(&self) -> &str {
            "text-only"
        }
    }

    #[tokio::test]
    async fn test_default_stream_is_unsupported() {
        let provider = TextOnlyProvider;
        let request = CompletionRequest::new(vec![Message::user("hi")]);
        let err = match provider.get_response_stream(request).await {
            Ok(_) => panic!("expected streaming to be unsupported"),
            Err(e) => e,
        };
        assert!(matches!(err, LlmError::StreamingUnsupported(name) if name == "text-only"));
        assert!(!provider.supports_streaming());
    }

    #[test]
    fn test_provider_event_terminal() {
        assert!(ProviderEvent::Done.is_terminal());
        assert!(ProviderEvent::Error {
            message: "boom".to_string()
        }
        .is_terminal());
        assert!(!ProviderEvent::Text {
            content: "hi".to_string()
        }
        .is_terminal());
    }
}
