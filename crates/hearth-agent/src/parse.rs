//! Response parsing: extracting structured JSON from free-text model output.
//!
//! Models return JSON raw, inside fenced code blocks, or embedded in prose,
//! sometimes with invisible characters that break naive parsers. This module
//! normalizes all of that into a single [`ParsedResponse`].

use std::sync::OnceLock;

use regex::Regex;

// ─────────────────────────────────────────────────────────────────────────────
// Invisible character stripping
// ─────────────────────────────────────────────────────────────────────────────

/// Characters silently inserted by some models/transports that break JSON
/// parsing: BOM, zero-width space/non-joiner/joiner, word joiner.
const INVISIBLE_CHARS: [char; 5] = ['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Remove invisible characters from the text.
///
/// Must run before any JSON parse attempt.
pub fn strip_invisible(text: &str) -> String {
    text.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsed response
// ─────────────────────────────────────────────────────────────────────────────

/// Classification of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// Plain text (cleaned and trimmed).
    Text(String),
    /// A JSON object without tool-call markers.
    Json(serde_json::Value),
    /// A JSON object carrying a `tool_calls` or `function_call` key.
    ToolCalls(serde_json::Value),
}

/// A parsed model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// What the response was classified as.
    pub kind: ResponseKind,
    /// The cleaned (but untrimmed) original text, kept for audit/debug.
    pub raw: String,
}

impl ParsedResponse {
    /// The extracted JSON object, if the response was structured.
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.kind {
            ResponseKind::Text(_) => None,
            ResponseKind::Json(v) | ResponseKind::ToolCalls(v) => Some(v),
        }
    }

    /// Returns true if the response is plain text.
    pub fn is_text(&self) -> bool {
        matches!(self.kind, ResponseKind::Text(_))
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.+?)\s*```").unwrap())
}

/// Try to extract a JSON object from cleaned text.
///
/// Order matters: fenced code blocks win over raw JSON elsewhere in the
/// text, then a whole-string parse, then the first-`{`/last-`}` span.
/// Only objects are accepted — arrays and scalars parse as JSON but carry
/// no protocol meaning here.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    if let Some(caps) = fence_regex().captures(text) {
        if let Some(obj) = parse_object(caps.get(1).map(|m| m.as_str()).unwrap_or_default()) {
            return Some(obj);
        }
    }

    if let Some(obj) = parse_object(text.trim()) {
        return Some(obj);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&text[start..=end])
}

fn parse_object(candidate: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Parse a raw model response into a [`ParsedResponse`].
pub fn parse(raw_text: &str) -> ParsedResponse {
    let cleaned = strip_invisible(raw_text);

    let kind = match extract_json_object(&cleaned) {
        Some(obj) => {
            let has_calls = obj.get("tool_calls").is_some() || obj.get("function_call").is_some();
            if has_calls {
                ResponseKind::ToolCalls(obj)
            } else {
                ResponseKind::Json(obj)
            }
        }
        None => ResponseKind::Text(cleaned.trim().to_string()),
    };

    ParsedResponse { kind, raw: cleaned }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let parsed = parse("The kitchen light is on.");
        assert!(parsed.is_text());
        assert!(matches!(parsed.kind, ResponseKind::Text(t) if t == "The kitchen light is on."));
    }

    #[test]
    fn test_direct_json_object() {
        let parsed = parse(r#"{"status": "ok"}"#);
        assert!(matches!(&parsed.kind, ResponseKind::Json(v) if v["status"] == "ok"));
    }

    #[test]
    fn test_tool_calls_key_classifies() {
        let parsed = parse(r#"{"tool_calls": []}"#);
        assert!(matches!(parsed.kind, ResponseKind::ToolCalls(_)));

        let parsed = parse(r#"{"function_call": {"name": "x"}}"#);
        assert!(matches!(parsed.kind, ResponseKind::ToolCalls(_)));
    }

    #[test]
    fn test_fenced_block_wins_over_embedded() {
        let text = "ignore {\"a\": 1} this\n```json\n{\"b\": 2}\n```\ntrailing";
        let parsed = parse(text);
        let obj = parsed.json().unwrap();
        assert_eq!(obj["b"], 2);
        assert!(obj.get("a").is_none());
    }

    #[test]
    fn test_plain_fence_without_language_tag() {
        let parsed = parse("```\n{\"x\": true}\n```");
        assert_eq!(parsed.json().unwrap()["x"], true);
    }

    #[test]
    fn test_embedded_object_span() {
        let parsed = parse("Here you go: {\"name\": \"light.kitchen\"} - done");
        assert_eq!(parsed.json().unwrap()["name"], "light.kitchen");
    }

    #[test]
    fn test_arrays_are_text() {
        let parsed = parse("[1, 2, 3]");
        assert!(parsed.is_text());
    }

    #[test]
    fn test_bare_scalars_are_text() {
        assert!(parse("42").is_text());
        assert!(parse("\"hello\"").is_text());
    }

    #[test]
    fn test_invisible_chars_stripped_before_parse() {
        let text = "\u{FEFF}{\"a\":\u{200B} 1}";
        let parsed = parse(text);
        assert_eq!(parsed.json().unwrap()["a"], 1);
        assert!(!parsed.raw.contains('\u{FEFF}'));
    }

    #[test]
    fn test_raw_preserves_untrimmed_text() {
        let parsed = parse("  hello  ");
        assert_eq!(parsed.raw, "  hello  ");
        assert!(matches!(parsed.kind, ResponseKind::Text(t) if t == "hello"));
    }

    #[test]
    fn test_malformed_fence_falls_through() {
        let parsed = parse("```json\nnot json\n```\n{\"ok\": 1}");
        assert_eq!(parsed.json().unwrap()["ok"], 1);
    }
}
