//! Mock provider for testing.
//!
//! Returns pre-configured replies in order, logging every request, so the
//! agent loop can be exercised deterministically without network access.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::{LlmError, Result};
use crate::provider::{AiProvider, EventStream, ProviderEvent};
use crate::types::CompletionRequest;

/// A scripted reply for [`MockProvider`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with a provider error carrying this message.
    Error(String),
    /// Stream exactly these events (streaming calls only; a non-streaming
    /// call concatenates the text deltas).
    Events(Vec<ProviderEvent>),
}

/// A mock provider for testing purposes.
///
/// Replies are consumed in order. If more requests are made than replies
/// are available, an error is returned.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    replies: Mutex<Vec<MockReply>>,
    request_log: Mutex<Vec<CompletionRequest>>,
    supports_tools: bool,
    supports_streaming: bool,
}

impl MockProvider {
    /// Create a mock provider with the given replies.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            name: "mock".to_string(),
            replies: Mutex::new(replies),
            request_log: Mutex::new(Vec::new()),
            supports_tools: true,
            supports_streaming: false,
        }
    }

    /// Create a mock provider with a single text reply.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockReply::Text(text.into())])
    }

    /// Create a mock provider that answers each request with the next text.
    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(|t| MockReply::Text(t.to_string())).collect())
    }

    /// Enable the streaming code path.
    pub fn streaming(mut self) -> Self {
        self.supports_streaming = true;
        self
    }

    /// Advertise no tool support.
    pub fn without_tools(mut self) -> Self {
        self.supports_tools = false;
        self
    }

    /// Get all requests that were made to this provider.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().unwrap().len()
    }

    fn next_reply(&self, request: CompletionRequest) -> Result<MockReply> {
        self.request_log.lock().unwrap().push(request);
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::provider("MockProvider: no more replies available"));
        }
        Ok(replies.remove(0))
    }
}

#[async_trait]
impl AiProvider for MockProvider {
    async fn get_response(&self, request: CompletionRequest) -> Result<String> {
        match self.next_reply(request)? {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(message) => Err(LlmError::Provider(message)),
            MockReply::Events(events) => {
                // Collapse a scripted stream into its text for one-shot calls.
                let text: String = events
                    .iter()
                    .filter_map(|e| match e {
                        ProviderEvent::Text { content } => Some(content.as_str()),
                        _ => None,
                    })
                    .collect();
                Ok(text)
            }
        }
    }

    async fn get_response_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let events = match self.next_reply(request)? {
            MockReply::Text(text) => vec![
                Ok(ProviderEvent::Text { content: text }),
                Ok(ProviderEvent::Done),
            ],
            MockReply::Error(message) => vec![Ok(ProviderEvent::Error { message })],
            MockReply::Events(events) => events.into_iter().map(Ok).collect(),
        };
        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
