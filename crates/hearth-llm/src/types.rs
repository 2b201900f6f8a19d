//! Core types for provider requests.
//!
//! These types are provider-agnostic: the same [`Message`] list is handed to
//! every backend, and each provider adapter translates it into its own wire
//! format. Tool calls ride inside assistant message content as JSON so that
//! history replays identically across provider families.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a message author.
///
/// `Function` is the tool-result role; it serializes as `"function"` on the
/// wire but `"tool"` and `"tool_result"` are accepted when reading history
/// produced by other stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    #[serde(alias = "tool", alias = "tool_result")]
    Function,
}

impl Role {
    /// Returns true for the tool-result role.
    pub fn is_tool_result(&self) -> bool {
        matches!(self, Role::Function)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        };
        write!(f, "{}", s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message content
// ─────────────────────────────────────────────────────────────────────────────

/// An image attachment carried alongside a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// MIME type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Base64-encoded image data.
    pub data: String,
}

impl ImageAttachment {
    /// Create a new attachment.
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// Message content: plain text, or text plus an image side-channel.
///
/// Provider adapters pattern-match on this exhaustively; there is no hidden
/// extras field to probe for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content.
    Text(String),
    /// Text with attached images, translated per-provider at the adapter.
    Multimodal {
        text: String,
        images: Vec<ImageAttachment>,
    },
}

impl MessageContent {
    /// The textual part of the content.
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(s) => s,
            MessageContent::Multimodal { text, .. } => text,
        }
    }

    /// Attached images, if any.
    pub fn images(&self) -> &[ImageAttachment] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Multimodal { images, .. } => images,
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,

    /// The content of the message.
    pub content: MessageContent,

    /// Tool name, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Echo of the tool call id, set on tool-result messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

impl Message {
    /// Create a message with the given role and text content.
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_use_id: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into())
    }

    /// Create a user message with text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    /// Create a user message carrying image attachments.
    pub fn user_with_images(text: impl Into<String>, images: Vec<ImageAttachment>) -> Self {
        Self::new(
            Role::User,
            MessageContent::Multimodal {
                text: text.into(),
                images,
            },
        )
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into())
    }

    /// Create a tool-result message.
    ///
    /// `content` is the JSON-encoded tool result or error.
    pub fn function_result(
        name: impl Into<String>,
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Function,
            content: MessageContent::Text(content.into()),
            name: Some(name.into()),
            tool_use_id: Some(tool_use_id.into()),
        }
    }

    /// The textual content of the message.
    pub fn text(&self) -> &str {
        self.content.text()
    }

    /// Returns true for system messages.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Returns true for tool-result messages.
    pub fn is_tool_result(&self) -> bool {
        self.role.is_tool_result()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Schema of a tool available to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Name of the tool.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema for the tool's input parameters.
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Create a new tool schema.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion request
// ─────────────────────────────────────────────────────────────────────────────

/// A completion request to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The messages in the conversation.
    pub messages: Vec<Message>,

    /// Tools available for the model to use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    /// Model override; the provider uses its configured default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a new request from a message list.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            model: None,
            max_tokens: None,
        }
    }

    /// Add tools to the request.
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Set a model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the generation cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
