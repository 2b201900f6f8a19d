//! The uniform event protocol.
//!
//! One tagged enum serves the tool executor's yield modes and the streaming
//! query processor, so callers consume the same events regardless of
//! provider capability or code path.

use serde::{Deserialize, Serialize};

/// An event emitted while processing a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Text content (a streaming delta, or a whole response in one-shot mode).
    Text {
        /// The text content.
        content: String,
    },
    /// Human-readable progress.
    Status {
        /// The status line.
        message: String,
    },
    /// A tool is about to execute.
    ToolCall {
        /// Call id.
        id: String,
        /// Tool name.
        name: String,
        /// Call arguments.
        arguments: serde_json::Value,
    },
    /// A tool finished (or was blocked).
    ToolResult {
        /// Call id.
        id: String,
        /// Tool name.
        name: String,
        /// Whether the tool succeeded.
        success: bool,
        /// The result or error content.
        content: serde_json::Value,
    },
    /// An error occurred; the stream terminates after this.
    Error {
        /// Error message.
        message: String,
    },
    /// Processing is complete.
    Done {
        /// Total loop iterations used.
        iterations: u32,
    },
}

impl AgentEvent {
    /// Create a text event.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a status event.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Create a done event.
    pub fn done(iterations: u32) -> Self {
        Self::Done { iterations }
    }

    /// Returns true if this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
