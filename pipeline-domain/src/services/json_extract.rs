//! Best-effort JSON array extraction from raw LLM completions, which
//! routinely wrap the requested JSON in prose, markdown fences, or a bare
//! object instead of the requested array.

use serde_json::{Deserializer, Value};

use crate::error::{PipelineError, Result};

/// Scans `raw` for the first `[` or `{` that begins a syntactically valid
/// JSON value and returns it as an array literal: an array is returned
/// verbatim, a bare object is wrapped as a single-element array. Falls
/// back to the span between the first `[` and the last `]` in the text
/// when no position yields a parseable value.
pub fn extract_json_array(raw: &str) -> Result<String> {
    for (i, ch) in raw.char_indices() {
        if ch != '[' && ch != '{' {
            continue;
        }
        let slice = &raw[i..];
        let mut stream = Deserializer::from_str(slice).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let end = stream.byte_offset();
                let snippet = &slice[..end];
                match value {
                    Value::Array(_) => return Ok(snippet.to_string()),
                    Value::Object(_) => return Ok(format!("[{snippet}]")),
                    _ => continue,
                }
            }
            _ => continue,
        }
    }

    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if end >= start {
            return Ok(raw[start..=end].to_string());
        }
    }

    Err(PipelineError::parse_failure("no valid JSON array/object found in LLM output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_clean_array() {
        let raw = r#"[{"a": 1}]"#;
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a": 1}]"#);
    }

    #[test]
    fn wraps_bare_object() {
        let raw = r#"{"a": 1}"#;
        assert_eq!(extract_json_array(raw).unwrap(), r#"[{"a": 1}]"#);
    }

    #[test]
    fn skips_leading_prose() {
        let raw = "Here is the result:\n[{\"a\": 1}]\nHope that helps.";
        let extracted = extract_json_array(raw).unwrap();
        let value: Value = serde_json::from_str(&extracted).unwrap();
        assert_eq!(value, serde_json::json!([{"a": 1}]));
    }

    #[test]
    fn falls_back_to_bracket_span_on_garbled_input() {
        let raw = "[broken, json";
        // no valid value parses here; there's no closing bracket either
        assert!(extract_json_array(raw).is_err());
    }

    #[test]
    fn empty_array_is_valid() {
        assert_eq!(extract_json_array("[]").unwrap(), "[]");
    }
}
