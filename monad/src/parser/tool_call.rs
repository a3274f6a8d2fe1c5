//! Embedded `<tool_call>` extraction over fully-accumulated text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Matches a tool-call block, tolerating an optional surrounding code fence
/// (plain or `xml`-annotated). Dot matches newline; case-insensitive.
static TOOL_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?si)(?:```(?:xml)?\s*)?<tool_call>(.*?)</tool_call>(?:\s*```)?")
        .expect("tool call regex compiles")
});

/// One extracted tool call.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Extracts embedded tool calls from `text`.
///
/// Returns the text with all matches removed and the calls in document
/// order. A match whose body is not valid `{name, arguments}` JSON is logged
/// and skipped (but still removed from the text).
pub fn extract_tool_calls(text: &str) -> (String, Vec<ParsedToolCall>) {
    let mut calls = Vec::new();
    for captures in TOOL_CALL_RE.captures_iter(text) {
        let body = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        match serde_json::from_str::<ParsedToolCall>(body.trim()) {
            Ok(call) => calls.push(call),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed tool call body");
            }
        }
    }
    let stripped = TOOL_CALL_RE.replace_all(text, "").into_owned();
    (stripped, calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A fenced xml tool call extracts as one call and leaves
    /// no tool_call text behind.
    #[test]
    fn fenced_xml_block() {
        let text = "before\n```xml\n<tool_call>{\"name\":\"t\",\"arguments\":{\"k\":1}}</tool_call>\n```\nafter";
        let (stripped, calls) = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "t");
        assert_eq!(calls[0].arguments, serde_json::json!({"k": 1}));
        assert!(!stripped.contains("tool_call"));
        assert!(stripped.contains("before"));
        assert!(stripped.contains("after"));
    }

    /// **Scenario**: Calls come back in document order.
    #[test]
    fn document_order() {
        let text = concat!(
            "<tool_call>{\"name\":\"first\",\"arguments\":{}}</tool_call>",
            " middle ",
            "<tool_call>{\"name\":\"second\",\"arguments\":{}}</tool_call>",
        );
        let (stripped, calls) = extract_tool_calls(text);
        assert_eq!(
            calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        assert_eq!(stripped.trim(), "middle");
    }

    /// **Scenario**: Malformed JSON is skipped but its text is still removed.
    #[test]
    fn malformed_body_skipped() {
        let text = "<tool_call>not json</tool_call> and <tool_call>{\"name\":\"ok\",\"arguments\":{}}</tool_call>";
        let (stripped, calls) = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "ok");
        assert!(!stripped.contains("tool_call"));
    }

    /// **Scenario**: Case-insensitive tag matching.
    #[test]
    fn case_insensitive() {
        let text = "<TOOL_CALL>{\"name\":\"up\",\"arguments\":{}}</TOOL_CALL>";
        let (_, calls) = extract_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "up");
    }

    /// **Scenario**: Text without tool calls passes through untouched.
    #[test]
    fn no_calls_no_change() {
        let (stripped, calls) = extract_tool_calls("plain answer");
        assert!(calls.is_empty());
        assert_eq!(stripped, "plain answer");
    }
}
