//! JSON extraction from model output.
//!
//! Chat models are asked for a single JSON object but occasionally wrap it
//! in prose or code fences. The whole content is tried first, then the
//! outermost `{...}` span. Anything else is rejected.

use serde_json::Value;

/// Extract a single JSON object from free-form model output
pub fn extract_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }

    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Message content of the first choice in a chat-completions response
pub fn choice_content(response: &Value) -> Option<&str> {
    response
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let value = extract_object(r#"{"summary": "ok"}"#).unwrap();
        assert_eq!(value["summary"], "ok");
    }

    #[test]
    fn test_fenced_object() {
        let content = "Here you go:\n```json\n{\"mood\": \"calm\", \"nested\": {\"a\": 1}}\n```";
        let value = extract_object(content).unwrap();
        assert_eq!(value["mood"], "calm");
        assert_eq!(value["nested"]["a"], 1);
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(extract_object("[1, 2, 3]").is_none());
        assert!(extract_object("no json here").is_none());
        assert!(extract_object("} backwards {").is_none());
        assert!(extract_object("{not valid json}").is_none());
    }

    #[test]
    fn test_choice_content() {
        let response = serde_json::json!({
            "choices": [{ "message": { "content": "{}" } }]
        });
        assert_eq!(choice_content(&response), Some("{}"));
        assert_eq!(choice_content(&serde_json::json!({})), None);
    }
}
