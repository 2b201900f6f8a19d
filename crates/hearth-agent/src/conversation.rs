//! Bounded conversation history.
//!
//! A FIFO of messages with a system-messages-first invariant: system
//! messages always sit contiguously at the front, most recently added
//! first, and survive trimming. No internal locking — callers serialize
//! access per agent/session.

use hearth_llm::{Message, Role};

/// Default conversation capacity.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Capacity-bounded, system-first message history.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationManager {
    /// Create a conversation with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_MESSAGES)
    }

    /// Create a conversation bounded to `max_messages`.
    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    /// Add a message with the given role and text content.
    ///
    /// System messages insert at index 0, so repeated system adds keep the
    /// most recent system message first; all other roles append.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.push(Message::new(role, content.into()));
    }

    /// Add a prebuilt message (e.g. a multimodal user turn or tool result).
    pub fn push(&mut self, message: Message) {
        if message.is_system() {
            self.messages.insert(0, message);
        } else {
            self.messages.push(message);
        }
        self.enforce_limit();
    }

    /// Add a user message.
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.add_message(Role::User, content);
    }

    /// Add an assistant message.
    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.add_message(Role::Assistant, content);
    }

    /// Get an independent copy of the history.
    pub fn get_messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Trim to at most `limit` messages.
    ///
    /// Keeps all system messages plus only the most recent
    /// `limit - system_count` non-system messages, re-concatenated
    /// system-first. A limit at or below the system count drops every
    /// non-system message; that is not an error.
    pub fn trim_to_limit(&mut self, limit: usize) {
        if self.messages.len() <= limit {
            return;
        }

        let (system, other): (Vec<Message>, Vec<Message>) =
            self.messages.drain(..).partition(|m| m.is_system());

        let keep = limit.saturating_sub(system.len());
        let start = other.len().saturating_sub(keep);

        self.messages = system;
        self.messages.extend(other.into_iter().skip(start));
    }

    /// Get up to the last `n` messages of the materialized view.
    ///
    /// "Last N" is computed on the already system-first-reordered list, not
    /// on chronological order: when system messages are present, the result
    /// is not necessarily the N most recently added non-system turns.
    pub fn get_last_n_messages(&self, n: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    fn enforce_limit(&mut self) {
        if self.messages.len() > self.max_messages {
            self.trim_to_limit(self.max_messages);
        }
    }
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
