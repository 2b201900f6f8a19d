//! Streaming query processing.
//!
//! The streaming variant shares the loop shape of
//! [`QueryProcessor::process`]: text deltas are emitted as they arrive,
//! tool-call deltas accumulate silently until the provider stream
//! completes, and providers without streaming degrade to one-shot calls
//! that still emit synthetic text events — callers see the same
//! [`AgentEvent`] protocol either way.

use std::collections::HashSet;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::json;

use hearth_llm::{
    CompletionRequest, Message, ProviderEvent, SharedProvider, ToolSchema,
};

use crate::codec;
use crate::compaction::{
    CompactionEngine, CompactionOptions, EFFECTIVE_MAX_CONTEXT_TOKENS, shrink_tool_results,
};
use crate::conversation::ConversationManager;
use crate::detect::{self, FunctionCall};
use crate::estimate::{ContextBudget, estimate_messages_tokens};
use crate::events::AgentEvent;
use crate::executor::{ToolExecutor, YieldMode};
use crate::processor::{QueryOptions, QueryProcessor};
use crate::tool::ToolContext;

/// A boxed stream of agent events.
pub type AgentStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Stream state
// ─────────────────────────────────────────────────────────────────────────────

struct StreamState {
    provider: SharedProvider,
    executor: ToolExecutor,
    compactor: CompactionEngine,
    compact_opts: CompactionOptions,
    messages: Vec<Message>,
    tools: Vec<ToolSchema>,
    allowed_names: HashSet<String>,
    denied_tools: Option<HashSet<String>>,
    ctx: ToolContext,
    model: Option<String>,
    max_iterations: u32,
}

/// What one provider round produced.
enum Round {
    /// Final text. `already_streamed` is true when the text went out as
    /// deltas and must not be re-emitted.
    Final {
        text: String,
        already_streamed: bool,
    },
    /// Tool calls, plus the assistant-message content that records them.
    Calls {
        assistant_content: String,
        calls: Vec<FunctionCall>,
    },
    /// The round failed; the message has already been yielded upstream.
    Failed(String),
}

fn request_for(state: &StreamState, tools: &[ToolSchema]) -> CompletionRequest {
    let mut request = CompletionRequest::new(state.messages.clone());
    if !tools.is_empty() && state.provider.supports_tools() {
        request = request.with_tools(tools.to_vec());
    }
    if let Some(model) = &state.model {
        request = request.with_model(model.clone());
    }
    request
}

/// Keep only calls whose names pass the allow-list, logging drops.
fn filter_allowed(calls: Vec<FunctionCall>, allowed: &HashSet<String>) -> Vec<FunctionCall> {
    let (kept, dropped): (Vec<_>, Vec<_>) =
        calls.into_iter().partition(|c| allowed.contains(&c.name));
    for call in &dropped {
        tracing::warn!(tool = %call.name, "Dropping streamed call to unknown tool");
    }
    kept
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

impl QueryProcessor {
    /// Process a query, emitting events as work happens.
    ///
    /// The conversation is read, not written: hosts consuming the event
    /// stream record the turn themselves once `done` arrives.
    pub fn process_stream(
        &self,
        conversation: &ConversationManager,
        query: &str,
        opts: &QueryOptions,
    ) -> AgentStream {
        let query = match self.sanitize_query(query, !opts.attachments.is_empty()) {
            Ok(query) => query,
            Err(reason) => {
                return Box::pin(futures::stream::iter(vec![AgentEvent::error(reason)]));
            }
        };

        let (tools, allowed_names) = self.visible_tools(opts);
        let state = StreamState {
            provider: self.provider(),
            executor: self.executor(),
            compactor: self.compactor(),
            compact_opts: self.compaction_options(opts),
            messages: self.build_messages(conversation, &query, opts),
            tools,
            allowed_names,
            denied_tools: opts.denied_tools.clone(),
            ctx: ToolContext::new(opts.user_id.clone(), opts.session_id.clone()),
            model: opts.model.clone().or_else(|| self.config().model.clone()),
            max_iterations: opts.max_iterations.unwrap_or(self.config().max_iterations),
        };

        create_query_stream(state)
    }
}

fn create_query_stream(state: StreamState) -> AgentStream {
    Box::pin(async_stream::stream! {
        let mut state = state;

        let (compacted, _) = state
            .compactor
            .compact(std::mem::take(&mut state.messages), &state.compact_opts)
            .await;
        state.messages = compacted;

        let budget = ContextBudget::compute(
            state.compact_opts.context_window.min(EFFECTIVE_MAX_CONTEXT_TOKENS),
        );

        let mut iterations: u32 = 0;

        loop {
            if iterations >= state.max_iterations {
                tracing::warn!(iterations, "Max iterations reached, forcing text-only answer");
                let request = request_for(&state, &[]);
                match state.provider.get_response(request).await {
                    Ok(text) => {
                        yield AgentEvent::text(text.trim());
                        yield AgentEvent::done(iterations);
                    }
                    Err(e) => {
                        yield AgentEvent::error(format!("Maximum iterations reached: {}", e));
                    }
                }
                return;
            }
            iterations += 1;

            let request = request_for(&state, &state.tools);

            let round;
            if state.provider.supports_streaming() {
                let mut llm_stream = match state.provider.get_response_stream(request).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        yield AgentEvent::error(e.to_string());
                        return;
                    }
                };

                let mut text_acc = String::new();
                let mut raw_calls: Vec<serde_json::Value> = Vec::new();
                let mut failed: Option<String> = None;

                while let Some(event) = llm_stream.next().await {
                    match event {
                        Ok(ProviderEvent::Text { content }) => {
                            text_acc.push_str(&content);
                            yield AgentEvent::text(content);
                        }
                        // Accumulated silently: a call only executes once
                        // the stream has finished emitting it.
                        Ok(ProviderEvent::ToolCall { call }) => raw_calls.push(call),
                        Ok(ProviderEvent::Done) => break,
                        Ok(ProviderEvent::Error { message }) => {
                            failed = Some(message);
                            break;
                        }
                        Err(e) => {
                            failed = Some(e.to_string());
                            break;
                        }
                    }
                }

                round = if let Some(message) = failed {
                    Round::Failed(message)
                } else if !raw_calls.is_empty() {
                    let calls =
                        filter_allowed(codec::normalize_tool_calls(&raw_calls), &state.allowed_names);
                    if calls.is_empty() {
                        Round::Final { text: text_acc.trim().to_string(), already_streamed: true }
                    } else {
                        // The provider supplied structured call objects:
                        // replay them verbatim, not re-encoded, since
                        // provider-side verification of prior turns may
                        // depend on byte-exact content.
                        Round::Calls {
                            assistant_content: json!({"tool_calls": raw_calls}).to_string(),
                            calls,
                        }
                    }
                } else {
                    match detect::detect(&text_acc, Some(&state.allowed_names)) {
                        Some(calls) => Round::Calls {
                            assistant_content: codec::encode_as_assistant_message(&calls),
                            calls,
                        },
                        None => Round::Final { text: text_acc.trim().to_string(), already_streamed: true },
                    }
                };
            } else {
                // No streaming capability: one-shot call per iteration,
                // synthetic events keep the protocol uniform.
                round = match state.provider.get_response(request).await {
                    Ok(response) => match detect::detect(&response, Some(&state.allowed_names)) {
                        Some(calls) => Round::Calls {
                            assistant_content: codec::encode_as_assistant_message(&calls),
                            calls,
                        },
                        None => Round::Final { text: response.trim().to_string(), already_streamed: false },
                    },
                    Err(e) => Round::Failed(e.to_string()),
                };
            }

            match round {
                Round::Failed(message) => {
                    yield AgentEvent::error(message);
                    return;
                }
                Round::Final { text, already_streamed } => {
                    if !already_streamed {
                        yield AgentEvent::text(text);
                    }
                    yield AgentEvent::done(iterations);
                    return;
                }
                Round::Calls { assistant_content, calls } => {
                    tracing::info!(
                        iteration = iterations,
                        tool_count = calls.len(),
                        "Executing streamed tool calls"
                    );

                    state.messages.push(Message::assistant(assistant_content));
                    let events = state
                        .executor
                        .execute_batch(
                            &calls,
                            &state.ctx,
                            &mut state.messages,
                            YieldMode::Result,
                            state.denied_tools.as_ref(),
                        )
                        .await;
                    for event in events {
                        yield event;
                    }

                    if estimate_messages_tokens(&state.messages) > budget.available_for_input {
                        state.messages =
                            shrink_tool_results(std::mem::take(&mut state.messages), budget.available_for_input);
                    }
                }
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
