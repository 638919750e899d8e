//! Completion-text extraction from provider response JSON.
//!
//! Providers disagree on response shape. Rather than one adapter per
//! provider, a single ordered list of extractors probes the shapes seen
//! in the wild and the first one producing non-empty text wins. Adding a
//! provider means adding one entry, not a new adapter.

use serde_json::Value;
use tracing::trace;

use crate::error::{ModelError, ModelResult};

type Extractor = fn(&Value) -> Option<String>;

/// Probed shapes, most specific first. A `choices` entry must win over a
/// bare top-level `text` field when a response carries both.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("bare_string", bare_string),
    ("chat_choices", chat_choices),
    ("completion_choices", completion_choices),
    ("message_list", message_list),
    ("message_content", message_content),
    ("text_field", text_field),
    ("content_field", content_field),
    ("generations", generations),
    ("output_field", output_field),
];

/// Pull completion text out of `raw`, whatever provider shape it is in.
///
/// Extractors that match but yield only whitespace are skipped, so a
/// response with an empty `choices` text can still be rescued by a
/// fallback field.
pub fn completion_text(raw: &Value) -> ModelResult<String> {
    for (name, extract) in EXTRACTORS {
        if let Some(text) = extract(raw) {
            let text = text.trim();
            if !text.is_empty() {
                trace!(shape = name, "extracted completion text");
                return Ok(text.to_string());
            }
        }
    }
    Err(ModelError::UnrecognizedResponse {
        detail: shape_of(raw),
    })
}

fn bare_string(raw: &Value) -> Option<String> {
    raw.as_str().map(str::to_string)
}

/// OpenAI chat: `choices[0].message.content`.
fn chat_choices(raw: &Value) -> Option<String> {
    raw.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Legacy OpenAI completions: `choices[0].text`.
fn completion_choices(raw: &Value) -> Option<String> {
    raw.get("choices")?
        .get(0)?
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A conversation transcript, top-level or under `messages`. The last
/// assistant turn wins; failing that, the last entry carrying content.
fn message_list(raw: &Value) -> Option<String> {
    let messages = match raw {
        Value::Array(items) => items.as_slice(),
        _ => raw.get("messages")?.as_array()?.as_slice(),
    };
    let content_of = |message: &Value| -> Option<String> {
        message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    for message in messages.iter().rev() {
        if message.get("role").and_then(Value::as_str) == Some("assistant") {
            if let Some(text) = content_of(message) {
                return Some(text);
            }
        }
    }
    messages.iter().rev().find_map(content_of)
}

fn message_content(raw: &Value) -> Option<String> {
    raw.get("message")?
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn text_field(raw: &Value) -> Option<String> {
    raw.get("text").and_then(Value::as_str).map(str::to_string)
}

/// Top-level `content`, either a string or an Anthropic-style list of
/// `{ "text": ... }` parts.
fn content_field(raw: &Value) -> Option<String> {
    let content = raw.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    let parts = content.as_array()?;
    let texts: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

/// Cohere-style `generations[0][0].text`.
fn generations(raw: &Value) -> Option<String> {
    raw.get("generations")?
        .get(0)?
        .get(0)?
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn output_field(raw: &Value) -> Option<String> {
    for key in ["output", "response"] {
        if let Some(text) = raw.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    None
}

fn shape_of(raw: &Value) -> String {
    match raw {
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(8).map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::String(_) => "string".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Null => "null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_chat_shape() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "a summary"}}]});
        assert_eq!(completion_text(&raw).unwrap(), "a summary");
    }

    #[test]
    fn test_legacy_completion_shape() {
        let raw = json!({"choices": [{"text": " completion text "}]});
        assert_eq!(completion_text(&raw).unwrap(), "completion text");
    }

    #[test]
    fn test_bare_string() {
        assert_eq!(completion_text(&json!("plain text")).unwrap(), "plain text");
    }

    #[test]
    fn test_anthropic_content_parts() {
        let raw = json!({"content": [{"type": "text", "text": "part one"}, {"type": "text", "text": "part two"}]});
        assert_eq!(completion_text(&raw).unwrap(), "part one\npart two");
    }

    #[test]
    fn test_message_list_prefers_last_assistant() {
        let raw = json!([
            {"role": "assistant", "content": "earlier"},
            {"role": "user", "content": "question"},
            {"role": "assistant", "content": "final answer"}
        ]);
        assert_eq!(completion_text(&raw).unwrap(), "final answer");
    }

    #[test]
    fn test_message_list_falls_back_to_last_content() {
        let raw = json!({"messages": [{"role": "tool", "content": "tool output"}]});
        assert_eq!(completion_text(&raw).unwrap(), "tool output");
    }

    #[test]
    fn test_generations_shape() {
        let raw = json!({"generations": [[{"text": "generated"}]]});
        assert_eq!(completion_text(&raw).unwrap(), "generated");
    }

    #[test]
    fn test_choices_beat_fallback_fields() {
        let raw = json!({
            "choices": [{"message": {"content": "from choices"}}],
            "text": "from text",
            "output": "from output"
        });
        assert_eq!(completion_text(&raw).unwrap(), "from choices");
    }

    #[test]
    fn test_blank_extraction_falls_through() {
        let raw = json!({
            "choices": [{"message": {"content": "   "}}],
            "text": "rescued"
        });
        assert_eq!(completion_text(&raw).unwrap(), "rescued");
    }

    #[test]
    fn test_unrecognized_object_names_keys() {
        let raw = json!({"id": "cmpl-1", "model": "m", "usage": {}});
        let err = completion_text(&raw).unwrap_err();
        match err {
            ModelError::UnrecognizedResponse { detail } => {
                assert!(detail.contains("id"), "detail was {detail}");
                assert!(detail.contains("model"));
            }
            other => panic!("expected UnrecognizedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_scalars() {
        assert!(completion_text(&json!(42)).is_err());
        assert!(completion_text(&json!(null)).is_err());
        assert!(completion_text(&json!("")).is_err());
    }
}
