use serde_json::Value;

use crate::error::AgentError;

/// Extract the first JSON document (object or array) from a string that may
/// contain surrounding text.
///
/// Handles common agent response formats:
/// - Clean JSON: `{"key": "value"}` or `[{"key": "value"}]`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_document(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON document found in response (length={})",
        text.len()
    )))
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced `{ ... }` or `[ ... ]` in prose that parses to an
/// object or to an array holding objects.
///
/// Scalar arrays such as `[1]` citations are skipped.
fn extract_first_document(text: &str) -> Option<String> {
    text.char_indices()
        .filter(|(_, ch)| *ch == '{' || *ch == '[')
        .filter_map(|(start, _)| {
            let end = balanced_end(&text[start..])?;
            let candidate = &text[start..start + end];
            let value = serde_json::from_str::<Value>(candidate).ok()?;
            is_document(&value).then(|| candidate.to_string())
        })
        .next()
}

fn is_document(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

/// Byte length of the balanced document at the start of `text`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' | '[' if !in_string => {
                depth += 1;
            }
            '}' | ']' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse the JSON document embedded in raw agent output.
pub fn parse_json(raw: &str) -> Result<Value, AgentError> {
    let json_str = extract_json(raw)?;
    serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse agent output: {e}")))
}

/// Parse output that is JSON as a whole: the trimmed text itself, or a single
/// fenced block spanning the entire response. Prose around a document is not
/// stripped.
pub fn parse_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let inner = trimmed.strip_prefix("```")?.strip_suffix("```")?;
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    serde_json::from_str(inner.trim()).ok()
}

/// Parse agent output, wrapping anything that is not JSON as a whole as
/// `{"raw": text}`.
pub fn payload_from_raw(raw: &str) -> Value {
    parse_payload(raw).unwrap_or_else(|| serde_json::json!({ "raw": raw }))
}
