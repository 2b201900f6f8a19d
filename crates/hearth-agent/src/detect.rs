//! Function-call detection across provider wire formats.
//!
//! A response can carry tool calls in the OpenAI, Gemini, or Anthropic
//! shape, in a loose custom shape, or as a raw `tool_calls` list. Each
//! format is an entry in a fixed-priority strategy table; the first
//! strategy producing calls wins. Priority is deliberate: a response can
//! legally contain overlapping keys (e.g. a stray `name`/`arguments` pair
//! echoed from a previous turn next to a real `tool_calls` array), and the
//! most structurally specific format must win.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parse;

// ─────────────────────────────────────────────────────────────────────────────
// FunctionCall
// ─────────────────────────────────────────────────────────────────────────────

/// A normalized tool call extracted from a model response.
///
/// Identity is `(id, name)`. When a provider supplies no id, one is
/// synthesized (`"gemini_" + name` for the Gemini shape, the name itself
/// otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider-assigned or synthesized call id.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Call arguments.
    #[serde(rename = "args", alias = "arguments", default)]
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    /// Create a call with a synthesized id equal to the name.
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            arguments,
        }
    }

    /// Create a call with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The `(id, name)` identity of this call.
    pub fn identity(&self) -> (&str, &str) {
        (&self.id, &self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Format strategies
// ─────────────────────────────────────────────────────────────────────────────

struct FormatStrategy {
    name: &'static str,
    extract: fn(&Value) -> Vec<FunctionCall>,
}

/// Extraction strategies in strict priority order.
const STRATEGIES: &[FormatStrategy] = &[
    FormatStrategy {
        name: "openai_tool_calls",
        extract: extract_openai,
    },
    FormatStrategy {
        name: "gemini_function_call",
        extract: extract_gemini,
    },
    FormatStrategy {
        name: "anthropic_tool_use",
        extract: extract_anthropic,
    },
    FormatStrategy {
        name: "simple",
        extract: extract_simple,
    },
    FormatStrategy {
        name: "raw_tool_calls",
        extract: extract_raw_list,
    },
];

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn object_args(value: Option<&Value>) -> Option<Map<String, Value>> {
    value.and_then(Value::as_object).cloned()
}

/// Arguments that may arrive as a JSON-encoded string. A parse failure
/// yields empty arguments, never a hard error.
fn lenient_args(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default(),
        _ => Map::new(),
    }
}

/// OpenAI shape: `{"tool_calls": [{"id", "function": {"name", "arguments"}}]}`
/// where `arguments` is usually a JSON-encoded string.
fn extract_openai(obj: &Value) -> Vec<FunctionCall> {
    let entries = match obj.get("tool_calls").and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            let function = entry.get("function")?.as_object()?;
            let name = non_empty_str(function.get("name"))?;
            let arguments = lenient_args(function.get("arguments"));
            let id = non_empty_str(entry.get("id")).unwrap_or(name);
            Some(FunctionCall::with_id(id, name, arguments))
        })
        .collect()
}

/// Gemini shape: `{"functionCall": {"name", "args": {...}}}`.
fn extract_gemini(obj: &Value) -> Vec<FunctionCall> {
    let call = match obj.get("functionCall") {
        Some(call) => call,
        None => return Vec::new(),
    };
    let name = match non_empty_str(call.get("name")) {
        Some(name) => name,
        None => return Vec::new(),
    };
    let arguments = object_args(call.get("args")).unwrap_or_default();
    vec![FunctionCall::with_id(
        format!("gemini_{}", name),
        name,
        arguments,
    )]
}

fn tool_use_entry(value: &Value) -> Option<FunctionCall> {
    let name = non_empty_str(value.get("name"))?;
    let arguments = object_args(value.get("input")).unwrap_or_default();
    let id = non_empty_str(value.get("id")).unwrap_or(name);
    Some(FunctionCall::with_id(id, name, arguments))
}

/// Anthropic shape: `{"tool_use": {"id", "name", "input"}}` with parallel
/// calls in an `additional_tool_calls` array of the same shape.
fn extract_anthropic(obj: &Value) -> Vec<FunctionCall> {
    let mut calls = Vec::new();
    if let Some(call) = obj.get("tool_use").and_then(tool_use_entry) {
        calls.push(call);
    }
    if calls.is_empty() {
        return calls;
    }
    if let Some(extra) = obj.get("additional_tool_calls").and_then(Value::as_array) {
        calls.extend(extra.iter().filter_map(tool_use_entry));
    }
    calls
}

/// Simple/custom shape: one of `function`/`name`/`tool` for the name and
/// one of `parameters`/`arguments`/`args` (a mapping) for the arguments.
fn extract_simple(obj: &Value) -> Vec<FunctionCall> {
    let name = ["function", "name", "tool"]
        .iter()
        .find_map(|key| non_empty_str(obj.get(*key)));
    let name = match name {
        Some(name) => name,
        None => return Vec::new(),
    };
    let arguments = ["parameters", "arguments", "args"]
        .iter()
        .find_map(|key| object_args(obj.get(*key)))
        .unwrap_or_default();
    vec![FunctionCall::new(name, arguments)]
}

/// Raw `tool_calls` list fallback, tolerant of entries whose arguments are
/// already objects and of entries without a `function` wrapper.
fn extract_raw_list(obj: &Value) -> Vec<FunctionCall> {
    let entries = match obj.get("tool_calls").and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| {
            if let Some(function) = entry.get("function").and_then(Value::as_object) {
                let name = non_empty_str(function.get("name"))?;
                let arguments = lenient_args(function.get("arguments"));
                let id = non_empty_str(entry.get("id")).unwrap_or(name);
                return Some(FunctionCall::with_id(id, name, arguments));
            }
            let name = non_empty_str(entry.get("name"))?;
            let arguments = lenient_args(entry.get("args").or_else(|| entry.get("arguments")));
            let id = non_empty_str(entry.get("id")).unwrap_or(name);
            Some(FunctionCall::with_id(id, name, arguments))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Detect function calls in a model response.
///
/// Returns `None` when the response carries no call — including when every
/// detected call names a tool outside `allowed_tool_names`. Callers must
/// distinguish "no call" only via `None`; a `Some` result is never empty.
pub fn detect(
    response_text: &str,
    allowed_tool_names: Option<&HashSet<String>>,
) -> Option<Vec<FunctionCall>> {
    let parsed = parse::parse(response_text);
    let obj = parsed.json()?;

    for strategy in STRATEGIES {
        let calls = (strategy.extract)(obj);
        if calls.is_empty() {
            continue;
        }

        tracing::debug!(
            format = strategy.name,
            count = calls.len(),
            "Function calls detected"
        );

        let calls = match allowed_tool_names {
            Some(allowed) => {
                let (kept, dropped): (Vec<_>, Vec<_>) =
                    calls.into_iter().partition(|c| allowed.contains(&c.name));
                for call in &dropped {
                    tracing::warn!(
                        tool = %call.name,
                        "Dropping call to unknown tool (not in allow-list)"
                    );
                }
                kept
            }
            None => calls,
        };

        if calls.is_empty() {
            return None;
        }
        return Some(calls);
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_text_returns_none() {
        assert!(detect("The light is already on.", None).is_none());
    }

    #[test]
    fn test_openai_shape_with_string_arguments() {
        let text = r#"{"tool_calls": [{"id": "call_1", "type": "function",
            "function": {"name": "light_on", "arguments": "{\"entity\": \"light.kitchen\"}"}}]}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "light_on");
        assert_eq!(calls[0].arguments["entity"], "light.kitchen");
    }

    #[test]
    fn test_openai_bad_argument_string_yields_empty_args() {
        let text = r#"{"tool_calls": [{"id": "c1",
            "function": {"name": "light_on", "arguments": "{broken"}}]}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls[0].name, "light_on");
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_gemini_shape_in_fenced_block() {
        let text = "```json\n{\"functionCall\": {\"name\": \"test\", \"args\": {}}}\n```";
        let calls = detect(text, None).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "test");
        assert_eq!(calls[0].id, "gemini_test");
        assert!(calls[0].arguments.is_empty());
    }

    #[test]
    fn test_anthropic_shape_with_additional_calls() {
        let text = r#"{"tool_use": {"id": "tu_1", "name": "get_state", "input": {"entity": "a"}},
            "additional_tool_calls": [{"id": "tu_2", "name": "get_state", "input": {"entity": "b"}}]}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[1].arguments["entity"], "b");
    }

    #[test]
    fn test_simple_shape() {
        let text = r#"{"tool": "climate_set", "parameters": {"temp": 21}}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls[0].name, "climate_set");
        assert_eq!(calls[0].id, "climate_set");
        assert_eq!(calls[0].arguments["temp"], 21);
    }

    #[test]
    fn test_raw_list_with_object_arguments() {
        let text = r#"{"tool_calls": [{"name": "light_on", "args": {"entity": "light.hall"}}]}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls[0].name, "light_on");
        assert_eq!(calls[0].arguments["entity"], "light.hall");
    }

    #[test]
    fn test_priority_tool_calls_beats_stray_simple_pair() {
        let text = r#"{"tool_calls": [{"id": "c1", "function": {"name": "real_call", "arguments": "{}"}}],
            "name": "stray_echo", "arguments": {"x": 1}}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "real_call");
    }

    #[test]
    fn test_priority_gemini_beats_anthropic() {
        let text = r#"{"functionCall": {"name": "from_gemini", "args": {}},
            "tool_use": {"id": "t", "name": "from_anthropic", "input": {}}}"#;
        let calls = detect(text, None).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "from_gemini");
    }

    #[test]
    fn test_allow_list_drops_unknown_tool() {
        let text = r#"{"functionCall": {"name": "b", "args": {}}}"#;
        assert!(detect(text, Some(&allowed(&["a"]))).is_none());
    }

    #[test]
    fn test_allow_list_keeps_known_in_mixed_batch() {
        let text = r#"{"tool_calls": [
            {"id": "c1", "function": {"name": "a", "arguments": "{}"}},
            {"id": "c2", "function": {"name": "b", "arguments": "{}"}}]}"#;
        let calls = detect(text, Some(&allowed(&["a"]))).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "a");
    }

    #[test]
    fn test_nameless_entries_are_skipped() {
        let text = r#"{"tool_calls": [{"id": "c1", "function": {"arguments": "{}"}}]}"#;
        assert!(detect(text, None).is_none());
    }
}
