//! Canonical tool-call encoding for assistant history messages.
//!
//! The model must see its own prior tool calls in a shape it recognizes,
//! and the same history may be replayed to any of the three provider
//! families. The canonical assistant encoding therefore carries a generic
//! `tool_calls` array AND an Anthropic-shaped `tool_use` projection of the
//! same calls simultaneously; decoding tolerates every shape and
//! de-duplicates.

use serde_json::{Map, Value, json};

use crate::detect::FunctionCall;

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn mapping(value: Option<&Value>) -> Map<String, Value> {
    value.and_then(Value::as_object).cloned().unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Normalization
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize raw call entries into [`FunctionCall`]s.
///
/// Entries without a non-empty string `name` are dropped, non-mapping
/// arguments are coerced to an empty mapping, and a missing `id` defaults
/// to the name. Applying this to its own serialized output is a no-op.
pub fn normalize_tool_calls(raw_calls: &[Value]) -> Vec<FunctionCall> {
    raw_calls
        .iter()
        .filter_map(|entry| {
            let name = non_empty_str(entry.get("name"))?;
            let arguments = mapping(entry.get("args").or_else(|| entry.get("arguments")));
            let id = non_empty_str(entry.get("id")).unwrap_or(name);
            Some(FunctionCall::with_id(id, name, arguments))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode calls as the content of an assistant message.
///
/// Emits both the generic `tool_calls` array and the `tool_use` /
/// `additional_tool_calls` projection of the same calls, so every provider
/// family recognizes its own shape when the history is replayed.
pub fn encode_as_assistant_message(calls: &[FunctionCall]) -> String {
    let generic: Vec<Value> = calls
        .iter()
        .map(|c| json!({"id": c.id, "name": c.name, "args": c.arguments}))
        .collect();

    let mut content = Map::new();
    content.insert("tool_calls".to_string(), Value::Array(generic));

    if let Some(first) = calls.first() {
        content.insert(
            "tool_use".to_string(),
            json!({"id": first.id, "name": first.name, "input": first.arguments}),
        );
        let additional: Vec<Value> = calls[1..]
            .iter()
            .map(|c| json!({"id": c.id, "name": c.name, "input": c.arguments}))
            .collect();
        if !additional.is_empty() {
            content.insert("additional_tool_calls".to_string(), Value::Array(additional));
        }
    }

    Value::Object(content).to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

fn decode_generic_entry(entry: &Value) -> Option<FunctionCall> {
    if let Some(function) = entry.get("function").and_then(Value::as_object) {
        let name = non_empty_str(function.get("name"))?;
        let arguments = mapping(function.get("arguments"));
        let id = non_empty_str(entry.get("id")).unwrap_or(name);
        return Some(FunctionCall::with_id(id, name, arguments));
    }
    let name = non_empty_str(entry.get("name"))?;
    let arguments = mapping(entry.get("args").or_else(|| entry.get("arguments")));
    let id = non_empty_str(entry.get("id")).unwrap_or(name);
    Some(FunctionCall::with_id(id, name, arguments))
}

fn decode_tool_use_entry(entry: &Value) -> Option<FunctionCall> {
    let name = non_empty_str(entry.get("name"))?;
    let arguments = mapping(entry.get("input"));
    let id = non_empty_str(entry.get("id")).unwrap_or(name);
    Some(FunctionCall::with_id(id, name, arguments))
}

/// Decode calls from parsed assistant message content.
///
/// Tolerant of the generic, Anthropic and Gemini shapes appearing in the
/// same object; duplicates are removed by `(id, name)`, preserving
/// first-seen order.
pub fn decode_from_assistant_content(parsed: &Value) -> Vec<FunctionCall> {
    let mut calls: Vec<FunctionCall> = Vec::new();

    if let Some(entries) = parsed.get("tool_calls").and_then(Value::as_array) {
        calls.extend(entries.iter().filter_map(decode_generic_entry));
    }

    if let Some(call) = parsed.get("tool_use").and_then(decode_tool_use_entry) {
        calls.push(call);
    }
    if let Some(extra) = parsed.get("additional_tool_calls").and_then(Value::as_array) {
        calls.extend(extra.iter().filter_map(decode_tool_use_entry));
    }

    if let Some(gemini) = parsed.get("functionCall") {
        if let Some(name) = non_empty_str(gemini.get("name")) {
            let arguments = mapping(gemini.get("args"));
            calls.push(FunctionCall::with_id(
                format!("gemini_{}", name),
                name,
                arguments,
            ));
        }
    }

    // Dedup by (id, name), first-seen order wins.
    let mut seen: Vec<(String, String)> = Vec::new();
    calls.retain(|c| {
        let key = (c.id.clone(), c.name.clone());
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });

    calls
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
