//! Recover JSON from free-form model output
//!
//! Models wrap answers in prose or markdown code fences. We scan for the
//! first position where a complete JSON object or array parses and ignore
//! everything after it.

use serde_json::Value;

/// First syntactically valid JSON object or array in `text`, if any
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim_start_matches('\u{feff}');

    for (idx, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            if value.is_object() || value.is_array() {
                return Some(value);
            }
        }
    }
    None
}

/// Like [`extract_json`] but only accepts an object
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Like [`extract_json`] but only accepts an array
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    match extract_json(text)? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_code_fence_and_prose() {
        let text = "Sure! Here is the mapping:\n```json\n{\"header_row\": 0, \"start_row\": 1}\n```\nLet me know.";
        assert_eq!(
            extract_json(text),
            Some(json!({"header_row": 0, "start_row": 1}))
        );
    }

    #[test]
    fn test_skips_broken_candidates() {
        let text = "Columns {date, amount} look like: [{\"transaction_id\": \"x\"}]";
        assert_eq!(extract_json(text), Some(json!([{"transaction_id": "x"}])));
    }

    #[test]
    fn test_nothing_recoverable() {
        assert_eq!(extract_json("I could not determine the columns."), None);
        assert_eq!(extract_json("{\"truncated\": "), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_typed_helpers() {
        assert!(extract_json_object("[1, 2]").is_none());
        assert_eq!(extract_json_array("result: [1, 2]").map(|a| a.len()), Some(2));
    }
}
