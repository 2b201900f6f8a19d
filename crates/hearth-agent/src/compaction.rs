//! Context compaction: fitting conversation history to a token budget.
//!
//! Two-phase strategy: AI summarization of older history (with a
//! best-effort memory flush of what is about to be discarded), falling back
//! to deterministic truncation when summarization is unavailable or fails.
//! A second, narrower path shrinks tool-result content mid-iteration
//! without ever dropping an assistant/tool pair.

use std::sync::Arc;

use futures::future::BoxFuture;

use hearth_llm::{CompletionRequest, Message, MessageContent, Role, SharedProvider};

use crate::estimate::{ContextBudget, estimate_message_tokens, estimate_messages_tokens};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User turns beyond which compaction triggers regardless of token count.
/// Bounds context growth on huge-window models and limits
/// lost-in-the-middle attention degradation.
pub const MAX_HISTORY_TURNS: usize = 12;

/// Fraction of the input budget at which compaction triggers.
pub const COMPACTION_TRIGGER_RATIO: f64 = 0.80;

/// Advertised context windows are capped at this for budget purposes.
pub const EFFECTIVE_MAX_CONTEXT_TOKENS: usize = 128_000;

/// Number of most recent history messages preserved verbatim.
pub const MIN_RECENT_MESSAGES: usize = 16;

/// A summary shorter than this (trimmed) is treated as a failure.
const SUMMARY_MIN_CHARS: usize = 20;

/// Per-message cap when formatting history for the summarizer.
const SUMMARY_MESSAGE_CHAR_CAP: usize = 2_000;

/// Total cap on the summarizer input.
const SUMMARY_INPUT_CHAR_CAP: usize = 40_000;

/// Starting cap for the in-loop tool-result shrink.
const TOOL_RESULT_CAP_START: usize = 2_000;

/// Floor for the in-loop tool-result shrink.
const TOOL_RESULT_CAP_FLOOR: usize = 200;

/// Marker prefixed to the injected summary message.
pub const SUMMARY_HEADER: &str = "[Previous conversation summary]";

const SUMMARIZER_PROMPT: &str = "\
You are summarizing the earlier part of a conversation between a user and \
their home assistant. Write the summary in the same language the \
conversation uses - never translate. Preserve: entity IDs, automation and \
scene names, user decisions and preferences, tool call outcomes, errors \
encountered, and any open or pending tasks. Discard greetings, small talk \
and filler. Output at most 500 words of summary and nothing else - no \
meta-commentary, no preamble.";

const ASSISTANT_ACK: &str = "\
Understood. I have the summarized context. For any new device or automation \
request I will still call the available tools rather than assume results \
from the summary.";

// ─────────────────────────────────────────────────────────────────────────────
// Memory flush
// ─────────────────────────────────────────────────────────────────────────────

/// Context handed to the memory-flush callback.
#[derive(Clone)]
pub struct FlushContext {
    /// The user the discarded history belongs to.
    pub user_id: String,
    /// The session the history came from, if known.
    pub session_id: Option<String>,
    /// Provider the callback may use for fact extraction.
    pub provider: SharedProvider,
}

/// Best-effort hook invoked with history that is about to be summarized
/// away. Returns the number of facts captured. Failures are logged and
/// ignored — compaction proceeds regardless.
pub type MemoryFlushFn = Arc<
    dyn Fn(Vec<Message>, FlushContext) -> BoxFuture<'static, std::result::Result<usize, String>>
        + Send
        + Sync,
>;

// ─────────────────────────────────────────────────────────────────────────────
// Trigger / outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why compaction fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionTrigger {
    /// Too many user turns, independent of token estimate.
    TurnLimit {
        /// Counted user-role messages.
        user_turns: usize,
    },
    /// Estimated tokens crossed the trigger threshold.
    TokenBudget {
        /// Estimated tokens of the full list.
        estimated: usize,
        /// The threshold that was crossed.
        threshold: usize,
    },
}

/// What compaction did to the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing needed to change; the input was returned as-is.
    Unchanged,
    /// Older history was summarized and the list rebuilt.
    Summarized {
        /// Message count before compaction.
        messages_before: usize,
        /// Message count after compaction.
        messages_after: usize,
        /// Length of the generated summary.
        summary_chars: usize,
    },
    /// Deterministic truncation was applied.
    Truncated {
        /// Message count before truncation.
        messages_before: usize,
        /// Message count after truncation.
        messages_after: usize,
    },
}

/// Per-call compaction parameters.
#[derive(Clone)]
pub struct CompactionOptions {
    /// The model's advertised context window.
    pub context_window: usize,
    /// User id, required for the memory flush to run.
    pub user_id: Option<String>,
    /// Session id, passed through to the memory flush.
    pub session_id: Option<String>,
    /// Names of enabled tools, used for the post-summary catalog refresh.
    pub enabled_tools: Vec<String>,
}

impl CompactionOptions {
    /// Create options for the given context window.
    pub fn new(context_window: usize) -> Self {
        Self {
            context_window,
            user_id: None,
            session_id: None,
            enabled_tools: Vec::new(),
        }
    }

    /// Set the user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the enabled tool names.
    pub fn with_enabled_tools(mut self, tools: Vec<String>) -> Self {
        self.enabled_tools = tools;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Decides whether and how to shrink a message list to fit its budget.
#[derive(Clone)]
pub struct CompactionEngine {
    provider: SharedProvider,
    flush: Option<MemoryFlushFn>,
}

impl CompactionEngine {
    /// Create an engine using the given provider for summarization.
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            flush: None,
        }
    }

    /// Attach a memory-flush callback.
    pub fn with_memory_flush(mut self, flush: MemoryFlushFn) -> Self {
        self.flush = Some(flush);
        self
    }

    /// Evaluate the compaction trigger for a message list.
    ///
    /// The turn-count cap is checked first and fires regardless of the
    /// token estimate.
    pub fn evaluate_trigger(
        messages: &[Message],
        budget: &ContextBudget,
    ) -> Option<CompactionTrigger> {
        let user_turns = messages.iter().filter(|m| m.role == Role::User).count();
        if user_turns > MAX_HISTORY_TURNS {
            return Some(CompactionTrigger::TurnLimit { user_turns });
        }

        let estimated = estimate_messages_tokens(messages);
        let threshold = (budget.available_for_input as f64 * COMPACTION_TRIGGER_RATIO) as usize;
        if estimated > threshold {
            return Some(CompactionTrigger::TokenBudget {
                estimated,
                threshold,
            });
        }

        None
    }

    /// Compact a message list if its budget demands it.
    ///
    /// Returns the (possibly rebuilt) list and what happened. When no
    /// trigger fires the input is returned unchanged and the provider is
    /// never called.
    pub async fn compact(
        &self,
        messages: Vec<Message>,
        opts: &CompactionOptions,
    ) -> (Vec<Message>, CompactionOutcome) {
        let window = opts.context_window.min(EFFECTIVE_MAX_CONTEXT_TOKENS);
        let budget = ContextBudget::compute(window);

        let trigger = match Self::evaluate_trigger(&messages, &budget) {
            Some(trigger) => trigger,
            None => return (messages, CompactionOutcome::Unchanged),
        };

        let messages_before = messages.len();
        tracing::info!(
            ?trigger,
            messages = messages_before,
            available = budget.available_for_input,
            "Compaction triggered"
        );

        let split = Split::of(&messages);

        // Too little old material to justify an AI call.
        if split.history.len() <= MIN_RECENT_MESSAGES + 2 {
            let truncated = truncate_fallback(&messages, budget.available_for_input);
            let messages_after = truncated.len();
            return (
                truncated,
                CompactionOutcome::Truncated {
                    messages_before,
                    messages_after,
                },
            );
        }

        // Walk the split point back onto a user-role boundary so an
        // assistant/tool-result run is never cut in half.
        let mut split_point = split.history.len() - MIN_RECENT_MESSAGES;
        while split_point > 0 && split.history[split_point].role != Role::User {
            split_point -= 1;
        }
        if split_point == 0 {
            let truncated = truncate_fallback(&messages, budget.available_for_input);
            let messages_after = truncated.len();
            return (
                truncated,
                CompactionOutcome::Truncated {
                    messages_before,
                    messages_after,
                },
            );
        }

        let old = &split.history[..split_point];
        let recent = &split.history[split_point..];

        self.flush_memory(old, opts).await;

        match self.summarize(old).await {
            Some(summary) => {
                let summary_chars = summary.chars().count();
                let mut rebuilt = Vec::with_capacity(recent.len() + 4);
                if let Some(system) = split.system {
                    rebuilt.push(system.clone());
                }
                rebuilt.push(Message::system(format!("{}\n{}", SUMMARY_HEADER, summary)));
                rebuilt.push(Message::assistant(ASSISTANT_ACK));
                if !opts.enabled_tools.is_empty() {
                    rebuilt.push(Message::system(format!(
                        "Tool catalog reminder - the following tools are available and must \
                         be used for device and automation actions: {}",
                        opts.enabled_tools.join(", ")
                    )));
                }
                rebuilt.extend(recent.iter().cloned());
                if let Some(query) = split.user_query {
                    rebuilt.push(query.clone());
                }

                // The rebuilt list can still be over budget when recent
                // messages are themselves huge.
                let rebuilt = if estimate_messages_tokens(&rebuilt) > budget.available_for_input {
                    tracing::warn!("Rebuilt list still over budget, truncating");
                    truncate_fallback(&rebuilt, budget.available_for_input)
                } else {
                    rebuilt
                };

                let messages_after = rebuilt.len();
                tracing::info!(
                    messages_before,
                    messages_after,
                    summary_chars,
                    "Compaction: summarized"
                );
                (
                    rebuilt,
                    CompactionOutcome::Summarized {
                        messages_before,
                        messages_after,
                        summary_chars,
                    },
                )
            }
            None => {
                let truncated = truncate_fallback(&messages, budget.available_for_input);
                let messages_after = truncated.len();
                (
                    truncated,
                    CompactionOutcome::Truncated {
                        messages_before,
                        messages_after,
                    },
                )
            }
        }
    }

    /// Invoke the memory-flush callback, swallowing any failure.
    async fn flush_memory(&self, old: &[Message], opts: &CompactionOptions) {
        let (flush, user_id) = match (&self.flush, &opts.user_id) {
            (Some(flush), Some(user_id)) => (flush, user_id.clone()),
            _ => return,
        };

        let ctx = FlushContext {
            user_id,
            session_id: opts.session_id.clone(),
            provider: self.provider.clone(),
        };

        match flush(old.to_vec(), ctx).await {
            Ok(captured) => {
                tracing::debug!(captured, messages = old.len(), "Memory flush complete");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Memory flush failed, continuing compaction");
            }
        }
    }

    /// Summarize old history. Returns `None` on provider failure or an
    /// unusably short summary — both non-fatal.
    async fn summarize(&self, old: &[Message]) -> Option<String> {
        let transcript = format_transcript(old);
        let request = CompletionRequest::new(vec![
            Message::system(SUMMARIZER_PROMPT),
            Message::user(transcript),
        ]);

        match self.provider.get_response(request).await {
            Ok(summary) => {
                let trimmed = summary.trim();
                if trimmed.chars().count() > SUMMARY_MIN_CHARS {
                    Some(trimmed.to_string())
                } else {
                    tracing::warn!(
                        chars = trimmed.chars().count(),
                        "Summarization produced an unusably short summary"
                    );
                    None
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summarization failed, falling back to truncation");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Split
// ─────────────────────────────────────────────────────────────────────────────

/// A message list split into optional leading system message, history, and
/// optional trailing user query.
struct Split<'a> {
    system: Option<&'a Message>,
    history: &'a [Message],
    user_query: Option<&'a Message>,
}

impl<'a> Split<'a> {
    fn of(messages: &'a [Message]) -> Self {
        let has_system = messages.first().is_some_and(|m| m.is_system());
        let start = usize::from(has_system);

        let has_query = messages.len() > start
            && messages.last().is_some_and(|m| m.role == Role::User);
        let end = messages.len() - usize::from(has_query);

        Self {
            system: has_system.then(|| &messages[0]),
            history: &messages[start..end],
            user_query: has_query.then(|| &messages[messages.len() - 1]),
        }
    }
}

/// Format history as `[role]: content` lines for the summarizer, applying
/// per-message and total caps.
fn format_transcript(old: &[Message]) -> String {
    let mut transcript = String::new();
    for msg in old {
        let content = cap_chars(msg.text(), SUMMARY_MESSAGE_CHAR_CAP);
        let line = format!("[{}]: {}\n", msg.role, content);
        if transcript.chars().count() + line.chars().count() > SUMMARY_INPUT_CHAR_CAP {
            break;
        }
        transcript.push_str(&line);
    }
    transcript
}

fn cap_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        text.chars().take(cap).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Truncation fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic truncation to fit `available` tokens.
///
/// Always keeps a leading system message and a trailing user query; walks
/// the middle from most recent to oldest, greedily keeping messages within
/// budget and dropping everything older than the first overflow — recency
/// wins over completeness. The oldest kept message is never an orphaned
/// tool result. Idempotent for a fixed budget.
pub fn truncate_fallback(messages: &[Message], available: usize) -> Vec<Message> {
    let split = Split::of(messages);

    let fixed: usize = split.system.map(estimate_message_tokens).unwrap_or(0)
        + split.user_query.map(estimate_message_tokens).unwrap_or(0);
    let mut remaining = available.saturating_sub(fixed);

    let mut kept_rev: Vec<Message> = Vec::new();
    for msg in split.history.iter().rev() {
        let cost = estimate_message_tokens(msg);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept_rev.push(msg.clone());
    }

    // A tool result without its assistant call confuses the model into
    // re-issuing the same call.
    while kept_rev.last().is_some_and(|m| m.is_tool_result()) {
        kept_rev.pop();
    }
    kept_rev.reverse();

    let mut result = Vec::with_capacity(kept_rev.len() + 2);
    if let Some(system) = split.system {
        result.push(system.clone());
    }
    result.extend(kept_rev);
    if let Some(query) = split.user_query {
        result.push(query.clone());
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// In-loop tool-result shrink
// ─────────────────────────────────────────────────────────────────────────────

/// Narrow compaction for use inside an active tool-call loop.
///
/// Never discards assistant/tool pairs (the model needs to remember what it
/// already tried); instead progressively truncates tool-result content,
/// halving the cap from 2000 down to a 200-char floor and re-measuring
/// after each pass. Falls back to [`truncate_fallback`] only if still over
/// budget at the floor.
pub fn shrink_tool_results(mut messages: Vec<Message>, available: usize) -> Vec<Message> {
    if estimate_messages_tokens(&messages) <= available {
        return messages;
    }

    let mut cap = TOOL_RESULT_CAP_START;
    loop {
        for msg in messages.iter_mut().filter(|m| m.is_tool_result()) {
            if msg.text().chars().count() > cap {
                msg.content = MessageContent::Text(cap_chars(msg.text(), cap));
            }
        }

        if estimate_messages_tokens(&messages) <= available {
            return messages;
        }
        if cap == TOOL_RESULT_CAP_FLOOR {
            break;
        }
        cap = (cap / 2).max(TOOL_RESULT_CAP_FLOOR);
    }

    truncate_fallback(&messages, available)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_llm::MockProvider;

    fn provider_with_summary(text: &str) -> Arc<MockProvider> {
        Arc::new(MockProvider::with_text(text))
    }

    fn filler(len: usize) -> String {
        "x".repeat(len)
    }

    /// system + alternating turns + trailing user query, 30 messages total,
    /// user turns kept at or below the turn cap.
    fn synthetic_history(content_len: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("You are the Hearth assistant.")];
        for _ in 0..9 {
            messages.push(Message::user(filler(content_len)));
            messages.push(Message::assistant(filler(content_len)));
            messages.push(Message::assistant(filler(content_len)));
        }
        messages.push(Message::assistant(filler(content_len)));
        messages.push(Message::user("and turn off the porch light"));
        messages
    }

    #[tokio::test]
    async fn test_under_budget_is_unchanged_and_provider_uncalled() {
        let provider = provider_with_summary("should never be used");
        let engine = CompactionEngine::new(provider.clone());

        let messages = vec![
            Message::system("prompt"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let opts = CompactionOptions::new(128_000);

        let (result, outcome) = engine.compact(messages.clone(), &opts).await;
        assert_eq!(result, messages);
        assert_eq!(outcome, CompactionOutcome::Unchanged);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_short_history_over_budget_truncates_without_summarizing() {
        let provider = provider_with_summary("should never be used");
        let engine = CompactionEngine::new(provider.clone());

        // Few messages, each enormous: over budget but history too short
        // to summarize.
        let messages = vec![
            Message::system("prompt"),
            Message::user(filler(200_000)),
            Message::assistant(filler(200_000)),
            Message::user("latest"),
        ];
        let opts = CompactionOptions::new(16_000);

        let (result, outcome) = engine.compact(messages, &opts).await;
        assert!(matches!(outcome, CompactionOutcome::Truncated { .. }));
        assert_eq!(provider.request_count(), 0);
        assert!(result.len() <= 4);
    }

    #[tokio::test]
    async fn test_turn_limit_triggers_independently_of_tokens() {
        let provider = provider_with_summary(
            "User configured several automations and asked about lighting scenes.",
        );
        let engine = CompactionEngine::new(provider.clone());

        // Tiny messages, way under any token budget, but 13 user turns.
        let mut messages = vec![Message::system("prompt")];
        for i in 0..13 {
            messages.push(Message::user(format!("u{}", i)));
            messages.push(Message::assistant(format!("a{}", i)));
        }
        let opts = CompactionOptions::new(128_000);

        let (_result, outcome) = engine.compact(messages, &opts).await;
        assert!(!matches!(outcome, CompactionOutcome::Unchanged));
    }

    #[tokio::test]
    async fn test_summarization_rebuild_shape() {
        let provider = provider_with_summary(
            "User renamed automation 'morning_wakeup' and asked for energy stats.",
        );
        let engine = CompactionEngine::new(provider.clone());

        let messages = synthetic_history(200);
        let before = messages.len();
        let opts = CompactionOptions::new(19_000);

        let (result, outcome) = engine.compact(messages, &opts).await;

        assert!(matches!(outcome, CompactionOutcome::Summarized { .. }));
        // Summarization called exactly once.
        assert_eq!(provider.request_count(), 1);
        assert!(result.len() < before);
        assert!(result[0].is_system());
        assert_eq!(result.last().unwrap().text(), "and turn off the porch light");
        assert!(result.iter().any(|m| m.text().contains(SUMMARY_HEADER)));
        // The acknowledgment nudging continued tool use is present.
        assert!(result.iter().any(|m| m.role == Role::Assistant && m.text().contains("tools")));
    }

    #[tokio::test]
    async fn test_summary_and_catalog_use_system_role() {
        let provider = provider_with_summary("A usable summary of the prior conversation here.");
        let engine = CompactionEngine::new(provider);

        let opts = CompactionOptions::new(19_000)
            .with_enabled_tools(vec!["get_state".to_string(), "call_service".to_string()]);
        let (result, _) = engine.compact(synthetic_history(200), &opts).await;

        let summary = result
            .iter()
            .find(|m| m.text().contains(SUMMARY_HEADER))
            .unwrap();
        assert_eq!(summary.role, Role::System);

        let catalog = result
            .iter()
            .find(|m| m.text().contains("Tool catalog reminder"))
            .unwrap();
        assert_eq!(catalog.role, Role::System);
        assert!(catalog.text().contains("get_state"));
    }

    #[tokio::test]
    async fn test_summarization_failure_falls_back_to_truncation() {
        let provider = Arc::new(MockProvider::new(vec![hearth_llm::MockReply::Error(
            "provider exploded".to_string(),
        )]));
        let engine = CompactionEngine::new(provider.clone());

        let (result, outcome) = engine
            .compact(synthetic_history(200), &CompactionOptions::new(19_000))
            .await;

        assert!(matches!(outcome, CompactionOutcome::Truncated { .. }));
        assert_eq!(provider.request_count(), 1);
        assert!(result[0].is_system());
        assert_eq!(result.last().unwrap().text(), "and turn off the porch light");
    }

    #[tokio::test]
    async fn test_too_short_summary_counts_as_failure() {
        let provider = provider_with_summary("ok");
        let engine = CompactionEngine::new(provider);

        let (_result, outcome) = engine
            .compact(synthetic_history(200), &CompactionOptions::new(19_000))
            .await;
        assert!(matches!(outcome, CompactionOutcome::Truncated { .. }));
    }

    #[tokio::test]
    async fn test_memory_flush_receives_old_messages() {
        use std::sync::Mutex;

        let provider = provider_with_summary("A summary long enough to be accepted here.");
        let seen: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();

        let flush: MemoryFlushFn = Arc::new(move |old, _ctx| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                *seen.lock().unwrap() = old.len();
                Ok(old.len())
            })
        });

        let engine = CompactionEngine::new(provider).with_memory_flush(flush);
        let opts = CompactionOptions::new(19_000).with_user("user-1");
        engine.compact(synthetic_history(200), &opts).await;

        assert!(*seen.lock().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_memory_flush_failure_is_swallowed() {
        let provider = provider_with_summary("A summary long enough to be accepted here.");
        let flush: MemoryFlushFn =
            Arc::new(|_old, _ctx| Box::pin(async { Err("memory backend down".to_string()) }));

        let engine = CompactionEngine::new(provider).with_memory_flush(flush);
        let opts = CompactionOptions::new(19_000).with_user("user-1");
        let (_, outcome) = engine.compact(synthetic_history(200), &opts).await;

        assert!(matches!(outcome, CompactionOutcome::Summarized { .. }));
    }

    #[tokio::test]
    async fn test_flush_skipped_without_user_id() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let provider = provider_with_summary("A summary long enough to be accepted here.");
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let flush: MemoryFlushFn = Arc::new(move |_old, _ctx| {
            called_clone.store(true, Ordering::SeqCst);
            Box::pin(async { Ok(0) })
        });

        let engine = CompactionEngine::new(provider).with_memory_flush(flush);
        engine
            .compact(synthetic_history(200), &CompactionOptions::new(19_000))
            .await;

        assert!(!called.load(Ordering::SeqCst));
    }

    // ── Truncation fallback ──────────────────────────────────────────────

    #[test]
    fn test_truncate_keeps_system_head_and_user_tail() {
        let mut messages = vec![Message::system("prompt")];
        for i in 0..20 {
            messages.push(Message::user(format!("u{} {}", i, filler(300))));
            messages.push(Message::assistant(format!("a{} {}", i, filler(300))));
        }
        messages.push(Message::user("latest question"));

        let result = truncate_fallback(&messages, 1_000);
        assert!(result.len() < messages.len());
        assert!(result[0].is_system());
        assert_eq!(result.last().unwrap().text(), "latest question");
    }

    #[test]
    fn test_truncate_prefers_recent() {
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(Message::user(format!("msg{} {}", i, filler(100))));
        }
        let result = truncate_fallback(&messages, 150);
        // The kept middle must be a suffix of the input.
        assert!(!result.is_empty());
        let first_kept = result[0].text().to_string();
        let idx = messages.iter().position(|m| m.text() == first_kept).unwrap();
        assert_eq!(&messages[idx..], &result[..]);
        assert!(idx > 0);
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let mut messages = vec![Message::system("prompt")];
        for i in 0..15 {
            messages.push(Message::user(format!("u{} {}", i, filler(200))));
            messages.push(Message::assistant(format!("a{} {}", i, filler(200))));
        }
        messages.push(Message::user("tail"));

        let once = truncate_fallback(&messages, 800);
        let twice = truncate_fallback(&once, 800);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_truncate_pops_orphaned_tool_results() {
        let messages = vec![
            Message::user(filler(3_000)),
            Message::assistant("calling tool"),
            Message::function_result("get_state", "c1", filler(100)),
            Message::assistant("done"),
            Message::user("tail"),
        ];
        // Budget fits the tool result and later messages, but not the
        // assistant message that requested it.
        let tail_cost = estimate_message_tokens(&messages[4]);
        let keep_cost: usize = messages[2..4].iter().map(estimate_message_tokens).sum();
        let result = truncate_fallback(&messages, tail_cost + keep_cost + 1);

        assert!(!result.is_empty());
        assert!(!result[0].is_tool_result());
    }

    // ── In-loop shrink ───────────────────────────────────────────────────

    #[test]
    fn test_shrink_noop_under_budget() {
        let messages = vec![
            Message::user("hi"),
            Message::function_result("get_state", "c1", filler(500)),
        ];
        let result = shrink_tool_results(messages.clone(), 10_000);
        assert_eq!(result, messages);
    }

    #[test]
    fn test_shrink_caps_only_tool_results() {
        let messages = vec![
            Message::user(filler(4_000)),
            Message::assistant("calling"),
            Message::function_result("dump", "c1", filler(10_000)),
        ];
        // Large enough that capping tool results to 2000 chars suffices.
        let result = shrink_tool_results(messages, 2_500);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].text().chars().count(), 4_000);
        assert!(result[2].text().chars().count() <= TOOL_RESULT_CAP_START);
    }

    #[test]
    fn test_shrink_halves_to_floor() {
        let messages = vec![
            Message::assistant("calling"),
            Message::function_result("dump", "c1", filler(10_000)),
            Message::function_result("dump", "c2", filler(10_000)),
        ];
        // Forces several halving passes before fitting.
        let result = shrink_tool_results(messages, 160);
        let longest = result
            .iter()
            .filter(|m| m.is_tool_result())
            .map(|m| m.text().chars().count())
            .max()
            .unwrap_or(0);
        assert!(longest <= TOOL_RESULT_CAP_FLOOR);
    }
}
