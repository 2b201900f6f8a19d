//! Batch tool execution.
//!
//! Calls run sequentially, in call order: batches are small and most tools
//! are I/O-bound against the same automation backend, so concurrency buys
//! nothing here. Every outcome — blocked, success, error — is folded back
//! into the message list as a `function`-role message; a failing tool never
//! aborts the batch or the surrounding query.

use std::collections::HashSet;
use std::sync::Arc;

use hearth_llm::Message;
use serde_json::json;

use crate::detect::FunctionCall;
use crate::events::AgentEvent;
use crate::tool::{ToolContext, ToolRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Hard cap on a serialized tool result. A backstop, not the primary
/// pagination mechanism — tools are expected to paginate themselves.
pub const MAX_TOOL_RESULT_CHARS: usize = 30_000;

const TRUNCATION_MARKER: &str =
    "\n[TRUNCATED - result exceeded the size limit. Use pagination parameters to fetch the rest.]";

// ─────────────────────────────────────────────────────────────────────────────
// Yield mode
// ─────────────────────────────────────────────────────────────────────────────

/// What the executor surfaces to the caller as live events.
///
/// The message list is updated identically in every mode; the mode only
/// controls the returned events. This lets one executor serve the
/// non-streaming path (`None`), the streaming tool loop (`Result`), and a
/// status-only UI (`Status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YieldMode {
    /// Return no events.
    #[default]
    None,
    /// Return human-readable progress strings.
    Status,
    /// Return structured tool_call/tool_result events.
    Result,
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

/// Executes batches of normalized calls against an injected registry.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    /// Create an executor over the given registry.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a batch of calls in order.
    ///
    /// Appends one `function`-role result message per call to `messages`
    /// and returns the events selected by `yield_mode`.
    pub async fn execute_batch(
        &self,
        calls: &[FunctionCall],
        ctx: &ToolContext,
        messages: &mut Vec<Message>,
        yield_mode: YieldMode,
        denied_tools: Option<&HashSet<String>>,
    ) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        for call in calls {
            if yield_mode == YieldMode::Result {
                events.push(AgentEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::Value::Object(call.arguments.clone()),
                });
            }
            if yield_mode == YieldMode::Status {
                events.push(AgentEvent::status(format!("Executing tool '{}'...", call.name)));
            }

            let blocked = denied_tools.is_some_and(|d| d.contains(&call.name));
            let (content, success) = if blocked {
                tracing::info!(tool = %call.name, "Tool blocked by denial list");
                (
                    json!({
                        "error": format!("Tool '{}' is not available in this context", call.name),
                        "tool": call.name,
                    }),
                    false,
                )
            } else {
                self.run_call(call, ctx).await
            };

            let serialized = cap_result(&content.to_string());
            messages.push(Message::function_result(&call.name, &call.id, serialized));

            match yield_mode {
                YieldMode::None => {}
                YieldMode::Status => {
                    let outcome = if success { "completed" } else { "failed" };
                    events.push(AgentEvent::status(format!("Tool '{}' {}", call.name, outcome)));
                }
                YieldMode::Result => {
                    events.push(AgentEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        success,
                        content,
                    });
                }
            }
        }

        events
    }

    async fn run_call(&self, call: &FunctionCall, ctx: &ToolContext) -> (serde_json::Value, bool) {
        tracing::debug!(
            tool = %call.name,
            call_id = %call.id,
            "Tool: executing"
        );

        let params = serde_json::Value::Object(call.arguments.clone());
        match self.registry.execute(&call.name, params, ctx).await {
            Ok(result) => {
                let success = result.is_success();
                if !success {
                    tracing::warn!(tool = %call.name, "Tool reported failure");
                }
                (result.to_value(), success)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                (json!({"error": e.to_string(), "tool": call.name}), false)
            }
        }
    }
}

/// Cap an oversized serialized result, appending an explicit marker.
fn cap_result(serialized: &str) -> String {
    if serialized.chars().count() <= MAX_TOOL_RESULT_CHARS {
        return serialized.to_string();
    }
    let mut capped: String = serialized.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    capped.push_str(TRUNCATION_MARKER);
    capped
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{MockTool, ToolResult};
    use hearth_llm::Role;
    use serde_json::Map;

    fn call(id: &str, name: &str) -> FunctionCall {
        FunctionCall::with_id(id, name, Map::new())
    }

    fn registry_with(tools: Vec<MockTool>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_success_appends_function_message() {
        let registry = registry_with(vec![
            MockTool::new("get_state").with_response(ToolResult::json(json!({"state": "on"}))),
        ]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        let events = executor
            .execute_batch(
                &[call("c1", "get_state")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::None,
                None,
            )
            .await;

        assert!(events.is_empty());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Function);
        assert_eq!(messages[0].name.as_deref(), Some("get_state"));
        assert_eq!(messages[0].tool_use_id.as_deref(), Some("c1"));
        assert!(messages[0].text().contains("\"state\""));
    }

    #[tokio::test]
    async fn test_denied_tools_blocked_but_batch_continues() {
        let registry = registry_with(vec![
            MockTool::new("call_service"),
            MockTool::new("get_state").with_response(ToolResult::text("ok")),
            MockTool::new("subagent_spawn"),
        ]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        let denied: HashSet<String> = ["call_service", "subagent_spawn"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        executor
            .execute_batch(
                &[
                    call("c1", "call_service"),
                    call("c2", "get_state"),
                    call("c3", "subagent_spawn"),
                ],
                &ToolContext::default(),
                &mut messages,
                YieldMode::None,
                Some(&denied),
            )
            .await;

        assert_eq!(messages.len(), 3);
        assert!(messages[0].text().contains("not available"));
        assert!(messages[0].text().contains("call_service"));
        assert!(messages[1].text().contains("ok"));
        assert!(messages[2].text().contains("not available"));
    }

    #[tokio::test]
    async fn test_tool_error_is_folded_not_propagated() {
        let registry = registry_with(vec![MockTool::new("flaky").failing("backend unreachable")]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        executor
            .execute_batch(
                &[call("c1", "flaky")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::None,
                None,
            )
            .await;

        assert_eq!(messages.len(), 1);
        let content: serde_json::Value = serde_json::from_str(messages[0].text()).unwrap();
        assert!(content["error"].as_str().unwrap().contains("backend unreachable"));
        assert_eq!(content["tool"], "flaky");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let registry = registry_with(vec![]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        executor
            .execute_batch(
                &[call("c1", "nonexistent")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::None,
                None,
            )
            .await;

        assert!(messages[0].text().contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_oversized_result_truncated_with_marker() {
        let big = "x".repeat(MAX_TOOL_RESULT_CHARS + 100);
        let registry = registry_with(vec![
            MockTool::new("dump").with_response(ToolResult::text(big)),
        ]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        executor
            .execute_batch(
                &[call("c1", "dump")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::None,
                None,
            )
            .await;

        let text = messages[0].text();
        assert!(text.contains("[TRUNCATED"));
        assert!(text.chars().count() <= MAX_TOOL_RESULT_CHARS + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn test_yield_mode_result_events() {
        let registry = registry_with(vec![
            MockTool::new("get_state").with_response(ToolResult::text("on")),
        ]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        let events = executor
            .execute_batch(
                &[call("c1", "get_state")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::Result,
                None,
            )
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AgentEvent::ToolCall { name, .. } if name == "get_state"));
        assert!(matches!(&events[1], AgentEvent::ToolResult { success: true, .. }));
    }

    #[tokio::test]
    async fn test_yield_mode_status_events() {
        let registry = registry_with(vec![MockTool::new("get_state")]);
        let executor = ToolExecutor::new(registry);
        let mut messages = Vec::new();

        let events = executor
            .execute_batch(
                &[call("c1", "get_state")],
                &ToolContext::default(),
                &mut messages,
                YieldMode::Status,
                None,
            )
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AgentEvent::Status { message } if message.contains("Executing")));
        assert!(matches!(&events[1], AgentEvent::Status { message } if message.contains("completed")));
    }
}
