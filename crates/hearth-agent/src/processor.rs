//! The query processor: orchestrating the provider/tool loop.
//!
//! Turns a user utterance into provider calls and tool invocations, bounded
//! by an iteration cap, with compaction applied before the first call and
//! mid-loop when tool results push the estimate over budget. Failures come
//! back as a structured [`QueryOutcome`], never as an escaping error.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hearth_llm::{
    CompletionRequest, ImageAttachment, Message, SharedProvider, ToolSchema,
};

use crate::codec;
use crate::compaction::{
    CompactionEngine, CompactionOptions, EFFECTIVE_MAX_CONTEXT_TOKENS, MemoryFlushFn,
    shrink_tool_results,
};
use crate::conversation::ConversationManager;
use crate::detect::{self, FunctionCall};
use crate::estimate::{ContextBudget, estimate_messages_tokens};
use crate::executor::{ToolExecutor, YieldMode};
use crate::parse;
use crate::tool::{ToolContext, ToolRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default cap on provider/tool loop iterations per query.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default cap on sanitized query length, in characters.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 1_000;

/// Default context window assumed when the host supplies none.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Substituted when the query is empty but attachments are present.
const ATTACHMENT_FALLBACK_QUERY: &str = "Describe what you see in the attached image.";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Construction-time processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Base system prompt.
    pub system_prompt: Option<String>,
    /// Default model override passed to the provider.
    pub model: Option<String>,
    /// Loop iteration cap.
    pub max_iterations: u32,
    /// Query length cap in characters.
    pub max_query_chars: usize,
    /// Context window used for budget computation.
    pub context_window: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl ProcessorConfig {
    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the context window.
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }
}

/// Per-call options.
///
/// Named optional fields instead of loose kwargs: everything a host can
/// vary per query is an explicit field with a validated default.
#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Image attachments for a multimodal turn.
    pub attachments: Vec<ImageAttachment>,
    /// Tools that must not execute for this call.
    pub denied_tools: Option<HashSet<String>>,
    /// Externally sourced history; takes precedence over the conversation
    /// manager for this call only.
    pub history: Option<Vec<Message>>,
    /// Context window override.
    pub context_window: Option<usize>,
    /// Iteration cap override.
    pub max_iterations: Option<u32>,
    /// Model override.
    pub model: Option<String>,
    /// User id, for tool context and memory flush.
    pub user_id: Option<String>,
    /// Session id, for tool context and memory flush.
    pub session_id: Option<String>,
    /// Retrieved context appended to the system prompt.
    pub rag_context: Option<String>,
}

impl QueryOptions {
    /// Add image attachments.
    pub fn with_attachments(mut self, attachments: Vec<ImageAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Set the denied-tools set.
    pub fn with_denied_tools(mut self, denied: HashSet<String>) -> Self {
        self.denied_tools = Some(denied);
        self
    }

    /// Provide external history for this call.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = Some(history);
        self
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

    /// Set retrieved context for the system prompt.
    pub fn with_rag_context(mut self, context: impl Into<String>) -> Self {
        self.rag_context = Some(context.into());
        self
    }

    /// Override the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Structured result of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Whether the query completed.
    pub success: bool,
    /// The final response text (empty on failure).
    pub text: String,
    /// Error description when `success` is false.
    pub error: Option<String>,
    /// Loop iterations used.
    pub iterations: u32,
    /// All tool calls executed across the loop.
    pub tool_calls_executed: Vec<FunctionCall>,
}

impl QueryOutcome {
    /// A completed query.
    pub fn completed(text: impl Into<String>, iterations: u32, calls: Vec<FunctionCall>) -> Self {
        Self {
            success: true,
            text: text.into(),
            error: None,
            iterations,
            tool_calls_executed: calls,
        }
    }

    /// A failed query.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            error: Some(error.into()),
            iterations: 0,
            tool_calls_executed: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrates the provider/tool loop for one agent.
///
/// Holds no per-query state; concurrent queries against the same
/// [`ConversationManager`] must be serialized by the caller.
pub struct QueryProcessor {
    provider: SharedProvider,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    compactor: CompactionEngine,
    config: ProcessorConfig,
}

impl QueryProcessor {
    /// Create a processor over the given provider and tool registry.
    pub fn new(provider: SharedProvider, registry: Arc<ToolRegistry>, config: ProcessorConfig) -> Self {
        Self {
            executor: ToolExecutor::new(registry.clone()),
            compactor: CompactionEngine::new(provider.clone()),
            provider,
            registry,
            config,
        }
    }

    /// Attach a memory-flush hook for compaction.
    pub fn with_memory_flush(mut self, flush: MemoryFlushFn) -> Self {
        self.compactor = self.compactor.with_memory_flush(flush);
        self
    }

    /// Get the processor configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process a query to completion (non-streaming).
    pub async fn process(
        &self,
        conversation: &mut ConversationManager,
        query: &str,
        opts: &QueryOptions,
    ) -> QueryOutcome {
        let query_id = Uuid::new_v4();

        let query = match self.sanitize_query(query, !opts.attachments.is_empty()) {
            Ok(query) => query,
            Err(reason) => {
                tracing::warn!(%query_id, reason = %reason, "Query rejected");
                return QueryOutcome::failed(reason);
            }
        };

        tracing::info!(%query_id, query_chars = query.chars().count(), "Query started");

        let (tools, allowed_names) = self.visible_tools(opts);
        let built = self.build_messages(conversation, &query, opts);
        let compact_opts = self.compaction_options(opts);
        let (mut messages, _) = self.compactor.compact(built, &compact_opts).await;

        let budget = ContextBudget::compute(
            compact_opts.context_window.min(EFFECTIVE_MAX_CONTEXT_TOKENS),
        );

        let ctx = ToolContext::new(opts.user_id.clone(), opts.session_id.clone());
        let max_iterations = opts.max_iterations.unwrap_or(self.config.max_iterations);
        let mut all_calls: Vec<FunctionCall> = Vec::new();
        let mut iterations: u32 = 0;

        loop {
            if iterations >= max_iterations {
                tracing::warn!(%query_id, iterations, "Max iterations reached, forcing text-only answer");
                // One last call with tools stripped entirely.
                let request = self.build_request(&messages, &[], opts);
                return match self.provider.get_response(request).await {
                    Ok(text) => {
                        self.record_turn(conversation, &query, &text);
                        QueryOutcome::completed(text, iterations, all_calls)
                    }
                    Err(e) => {
                        tracing::error!(%query_id, error = %e, "Final text-only call failed");
                        QueryOutcome {
                            success: false,
                            text: String::new(),
                            error: Some(format!("Maximum iterations reached: {}", e)),
                            iterations,
                            tool_calls_executed: all_calls,
                        }
                    }
                };
            }
            iterations += 1;

            tracing::debug!(
                %query_id,
                iteration = iterations,
                messages = messages.len(),
                estimated_tokens = estimate_messages_tokens(&messages),
                "Calling provider"
            );

            let request = self.build_request(&messages, &tools, opts);
            let response = match self.provider.get_response(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(%query_id, iteration = iterations, error = %e, "Provider call failed");
                    return QueryOutcome {
                        success: false,
                        text: String::new(),
                        error: Some(format!("Provider error: {}", e)),
                        iterations,
                        tool_calls_executed: all_calls,
                    };
                }
            };

            let calls = match detect::detect(&response, Some(&allowed_names)) {
                Some(calls) => calls,
                None => {
                    let text = response.trim().to_string();
                    tracing::info!(
                        %query_id,
                        iterations,
                        tool_calls = all_calls.len(),
                        response_chars = text.chars().count(),
                        "Query completed"
                    );
                    self.record_turn(conversation, &query, &text);
                    return QueryOutcome::completed(text, iterations, all_calls);
                }
            };

            tracing::info!(
                %query_id,
                iteration = iterations,
                tool_count = calls.len(),
                tools = %calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
                "Executing tools"
            );

            // The model must see its own prior calls when the loop re-asks.
            messages.push(Message::assistant(codec::encode_as_assistant_message(&calls)));
            self.executor
                .execute_batch(
                    &calls,
                    &ctx,
                    &mut messages,
                    YieldMode::None,
                    opts.denied_tools.as_ref(),
                )
                .await;
            all_calls.extend(calls);

            if estimate_messages_tokens(&messages) > budget.available_for_input {
                tracing::debug!(%query_id, "Tool results pushed context over budget, shrinking");
                messages = shrink_tool_results(messages, budget.available_for_input);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shared building blocks (also used by the streaming path)
    // ─────────────────────────────────────────────────────────────────────

    /// Sanitize a raw query: strip invisible characters, trim, cap length.
    ///
    /// An empty result is an error unless attachments are present, in which
    /// case a generic describe-the-image query is substituted.
    pub(crate) fn sanitize_query(
        &self,
        query: &str,
        has_attachments: bool,
    ) -> std::result::Result<String, String> {
        let cleaned = parse::strip_invisible(query);
        let trimmed = cleaned.trim();

        if trimmed.is_empty() {
            if has_attachments {
                return Ok(ATTACHMENT_FALLBACK_QUERY.to_string());
            }
            return Err("Query is empty".to_string());
        }

        if trimmed.chars().count() > self.config.max_query_chars {
            Ok(trimmed.chars().take(self.config.max_query_chars).collect())
        } else {
            Ok(trimmed.to_string())
        }
    }

    /// Tool schemas offered to the provider (denial-filtered) and the full
    /// set of registry names used to validate detected calls.
    ///
    /// Denied tools stay in the allow-list so a call to one reaches the
    /// executor and produces a visible "not available" result instead of
    /// being silently dropped as a hallucination.
    pub(crate) fn visible_tools(&self, opts: &QueryOptions) -> (Vec<ToolSchema>, HashSet<String>) {
        let denied = opts.denied_tools.clone().unwrap_or_default();
        let schemas = self
            .registry
            .schemas()
            .into_iter()
            .filter(|s| !denied.contains(&s.name))
            .collect();
        let allowed: HashSet<String> = self.registry.names().into_iter().collect();
        (schemas, allowed)
    }

    /// Build the message list for the first provider call.
    pub(crate) fn build_messages(
        &self,
        conversation: &ConversationManager,
        query: &str,
        opts: &QueryOptions,
    ) -> Vec<Message> {
        let mut messages = Vec::new();

        if let Some(system) = self.system_prompt(opts) {
            messages.push(Message::system(system));
        }

        match &opts.history {
            Some(history) => messages.extend(history.iter().cloned()),
            None => messages.extend(conversation.get_messages()),
        }

        if opts.attachments.is_empty() {
            messages.push(Message::user(query));
        } else {
            messages.push(Message::user_with_images(query, opts.attachments.clone()));
        }

        messages
    }

    fn system_prompt(&self, opts: &QueryOptions) -> Option<String> {
        match (&self.config.system_prompt, &opts.rag_context) {
            (Some(prompt), Some(rag)) => Some(format!("{}\n\n[Relevant context]\n{}", prompt, rag)),
            (Some(prompt), None) => Some(prompt.clone()),
            (None, Some(rag)) => Some(format!("[Relevant context]\n{}", rag)),
            (None, None) => None,
        }
    }

    /// Compaction options for this call.
    pub(crate) fn compaction_options(&self, opts: &QueryOptions) -> CompactionOptions {
        let mut enabled: Vec<String> = self.registry.names();
        if let Some(denied) = &opts.denied_tools {
            enabled.retain(|name| !denied.contains(name));
        }
        enabled.sort();

        CompactionOptions {
            context_window: opts.context_window.unwrap_or(self.config.context_window),
            user_id: opts.user_id.clone(),
            session_id: opts.session_id.clone(),
            enabled_tools: enabled,
        }
    }

    /// Build a provider request, omitting tools when the schema list is
    /// empty or the provider cannot accept them.
    pub(crate) fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        opts: &QueryOptions,
    ) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages.to_vec());
        if !tools.is_empty() && self.provider.supports_tools() {
            request = request.with_tools(tools.to_vec());
        }
        if let Some(model) = opts.model.as_ref().or(self.config.model.as_ref()) {
            request = request.with_model(model.clone());
        }
        request
    }

    /// Record a completed turn in the conversation manager.
    pub(crate) fn record_turn(
        &self,
        conversation: &mut ConversationManager,
        query: &str,
        response: &str,
    ) {
        conversation.add_user_message(query);
        conversation.add_assistant_message(response);
    }

    pub(crate) fn provider(&self) -> SharedProvider {
        self.provider.clone()
    }

    pub(crate) fn executor(&self) -> ToolExecutor {
        self.executor.clone()
    }

    pub(crate) fn compactor(&self) -> CompactionEngine {
        self.compactor.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
