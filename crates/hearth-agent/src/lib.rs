//! Conversational core for Hearth.
//!
//! This crate turns a user utterance into a sequence of provider calls and
//! tool invocations, manages a bounded conversation window across
//! provider-specific wire formats, and keeps the running context under the
//! model's token budget.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  QueryProcessor                                             │
//! │  - sanitizes input, builds the message list                 │
//! │  - runs the provider/tool loop (streaming or one-shot)      │
//! └─────────────────────────────────────────────────────────────┘
//!        │               │                │              │
//!        ▼               ▼                ▼              ▼
//!  ┌──────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//!  │Conversa- │   │ Compaction │   │ Detection │   │ Tool     │
//!  │tion Mgr  │   │ Engine     │   │ + Codec   │   │ Executor │
//!  └──────────┘   └────────────┘   └───────────┘   └──────────┘
//! ```
//!
//! Token estimation ([`estimate`]) and the tool-call codec ([`codec`]) are
//! shared utilities used throughout.

pub mod codec;
pub mod compaction;
pub mod conversation;
pub mod detect;
pub mod error;
pub mod estimate;
pub mod events;
pub mod executor;
pub mod parse;
pub mod processor;
pub mod stream;
pub mod tool;

// Re-export core types
pub use error::{AgentError, Result};

// Re-export estimation
pub use estimate::{
    CHARS_PER_TOKEN, ContextBudget, TOOL_SCHEMA_RESERVE_TOKENS, estimate_messages_tokens,
    estimate_tokens, estimate_total_tokens,
};

// Re-export parsing and detection
pub use detect::{FunctionCall, detect};
pub use parse::{ParsedResponse, ResponseKind, parse, strip_invisible};

// Re-export the codec
pub use codec::{decode_from_assistant_content, encode_as_assistant_message, normalize_tool_calls};

// Re-export tool types
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};

// Re-export execution
pub use events::AgentEvent;
pub use executor::{MAX_TOOL_RESULT_CHARS, ToolExecutor, YieldMode};

// Re-export conversation management
pub use conversation::{ConversationManager, DEFAULT_MAX_MESSAGES};

// Re-export compaction
pub use compaction::{
    CompactionEngine, CompactionOptions, CompactionOutcome, CompactionTrigger, FlushContext,
    MAX_HISTORY_TURNS, MIN_RECENT_MESSAGES, MemoryFlushFn, shrink_tool_results, truncate_fallback,
};

// Re-export the processor
pub use processor::{ProcessorConfig, QueryOptions, QueryOutcome, QueryProcessor};
pub use stream::AgentStream;

// Re-export the provider contract for convenience
pub use hearth_llm::{
    AiProvider, CompletionRequest, ImageAttachment, Message, MessageContent, Role, SharedProvider,
    ToolSchema,
};
