//! Tool registry contract.
//!
//! Tools themselves (entity control, automations, dashboards) live in the
//! host; the core only needs this trait and registry to look up schemas and
//! execute calls. The registry is injected wherever it is used — there is
//! no process-wide singleton — so tests and concurrent agent instances stay
//! isolated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use hearth_llm::ToolSchema;

use crate::error::{AgentError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for tools the assistant can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of this tool.
    fn name(&self) -> &str;

    /// Get a human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for this tool's parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Identifier of the user the query belongs to, if known.
    pub user_id: Option<String>,
    /// Identifier of the conversation session, if known.
    pub session_id: Option<String>,
}

impl ToolContext {
    /// Create a context for the given user and session.
    pub fn new(user_id: Option<String>, session_id: Option<String>) -> Self {
        Self { user_id, session_id }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    /// Successful text output.
    Text {
        /// The text content.
        content: String,
    },
    /// Successful JSON output.
    Json {
        /// The JSON content.
        content: serde_json::Value,
    },
    /// Tool execution failed.
    Error {
        /// Error message.
        message: String,
    },
}

impl ToolResult {
    /// Create a text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a JSON result.
    pub fn json(content: serde_json::Value) -> Self {
        Self::Json { content }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    /// The result as a JSON value, ready to embed in a tool-result message.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Text { content } => serde_json::Value::String(content.clone()),
            Self::Json { content } => content.clone(),
            Self::Error { message } => serde_json::json!({"error": message}),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of available tools.
///
/// Provides lookup by name, schema export for provider calls, and
/// execution. Registering a tool under an existing name replaces it.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a tool from an Arc.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool names.
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Export all tools as provider schemas.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|tool| ToolSchema::new(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(params, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A mock tool for testing: configurable response, recorded calls.
#[cfg(test)]
#[derive(Debug)]
pub struct MockTool {
    name: String,
    description: String,
    response: std::sync::Mutex<Option<ToolResult>>,
    fail_with: std::sync::Mutex<Option<String>>,
    calls: std::sync::Mutex<Vec<serde_json::Value>>,
}

#[cfg(test)]
impl MockTool {
    /// Create a new mock tool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "A mock tool for testing".to_string(),
            response: std::sync::Mutex::new(None),
            fail_with: std::sync::Mutex::new(None),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Set the response to return.
    pub fn with_response(self, response: ToolResult) -> Self {
        *self.response.lock().unwrap() = Some(response);
        self
    }

    /// Make execution return an `Err` instead of a result.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock().unwrap() = Some(message.into());
        self
    }

    /// Get the calls that were made to this tool.
    pub fn calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, params: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult> {
        self.calls.lock().unwrap().push(params);

        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(AgentError::tool(message));
        }

        Ok(self
            .response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ToolResult::text("mock response")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::text("done");
        assert!(result.is_success());
        assert_eq!(result.to_value(), serde_json::json!("done"));
    }

    #[test]
    fn test_tool_result_error_value() {
        let result = ToolResult::error("no such entity");
        assert!(!result.is_success());
        assert_eq!(result.to_value()["error"], "no such entity");
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool::new("light_on"));

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("light_on"));
        assert!(!registry.contains("light_off"));
        assert_eq!(registry.get("light_on").unwrap().name(), "light_on");
    }

    #[test]
    fn test_registry_schemas() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool::new("get_state"));

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "get_state");
    }

    #[tokio::test]
    async fn test_registry_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool::new("get_state").with_response(ToolResult::json(
            serde_json::json!({"state": "on"}),
        )));

        let ctx = ToolContext::default();
        let result = registry
            .execute("get_state", serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(result.is_success());

        let missing = registry.execute("unknown", serde_json::json!({}), &ctx).await;
        assert!(matches!(missing, Err(AgentError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_mock_tool_records_calls() {
        let tool = MockTool::new("test");
        let ctx = ToolContext::default();
        tool.execute(serde_json::json!({"a": 1}), &ctx).await.unwrap();
        assert_eq!(tool.call_count(), 1);
        assert_eq!(tool.calls()[0]["a"], 1);
    }
}
