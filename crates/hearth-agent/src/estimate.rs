//! Token estimation and context budget arithmetic.
//!
//! No tokenizer is involved: estimates are character-based so they stay
//! deterministic and computable offline. The ratio is deliberately
//! conservative for multilingual text.

use hearth_llm::{Message, ToolSchema};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Characters per token. Three is conservative; real tokenizers average
/// closer to four for English but less for other languages.
pub const CHARS_PER_TOKEN: usize = 3;

/// Fixed per-message overhead approximating role/separator tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Stand-in for the cost of 12-20 loaded tool schemas, subtracted from the
/// budget wherever schemas are not counted explicitly.
pub const TOOL_SCHEMA_RESERVE_TOKENS: usize = 5_000;

/// Default tokens reserved for the model's own output.
pub const DEFAULT_OUTPUT_RESERVE_TOKENS: usize = 8_192;

/// Default fraction of the window held back as a safety buffer.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.20;

// ─────────────────────────────────────────────────────────────────────────────
// Estimation
// ─────────────────────────────────────────────────────────────────────────────

/// Estimate token count for a string.
///
/// Counts characters, not bytes, so non-ASCII text does not inflate the
/// estimate.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Estimate tokens for a single message, including structural overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(message.text()) + MESSAGE_OVERHEAD_TOKENS
}

/// Estimate total tokens for a message list.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for messages plus serialized tool schemas.
///
/// Used where schema cost must be counted explicitly; elsewhere
/// [`TOOL_SCHEMA_RESERVE_TOKENS`] is subtracted from the budget instead.
pub fn estimate_total_tokens(messages: &[Message], tools: &[ToolSchema]) -> usize {
    let schema_tokens: usize = tools
        .iter()
        .map(|t| {
            serde_json::to_string(t)
                .map(|s| estimate_tokens(&s))
                .unwrap_or(0)
        })
        .sum();
    estimate_messages_tokens(messages) + schema_tokens
}

// ─────────────────────────────────────────────────────────────────────────────
// Context budget
// ─────────────────────────────────────────────────────────────────────────────

/// Derived token budget for one provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// The context window the budget was computed against.
    pub total: usize,
    /// Tokens available for input messages.
    pub available_for_input: usize,
    /// Tokens reserved for the model's output.
    pub output_reserve: usize,
    /// Tokens held back as a safety buffer.
    pub safety_buffer: usize,
}

impl ContextBudget {
    /// Compute a budget for the given context window with default reserves.
    pub fn compute(window: usize) -> Self {
        Self::compute_with(window, DEFAULT_OUTPUT_RESERVE_TOKENS, DEFAULT_SAFETY_MARGIN)
    }

    /// Compute a budget with explicit output reserve and safety margin.
    pub fn compute_with(window: usize, output_reserve: usize, safety_margin: f64) -> Self {
        let safety_buffer = (window as f64 * safety_margin) as usize;
        let available_for_input = window
            .saturating_sub(output_reserve)
            .saturating_sub(safety_buffer)
            .saturating_sub(TOOL_SCHEMA_RESERVE_TOKENS);
        Self {
            total: window,
            available_for_input,
            output_reserve,
            safety_buffer,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
