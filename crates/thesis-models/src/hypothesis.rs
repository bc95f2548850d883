use serde_json::Value;

/// Key under which the trader schema wraps a list of hypotheses.
pub const ITEMS_KEY: &str = "items";

/// Normalize a trader payload into a flat list of hypothesis records.
///
/// Rules:
/// - array: returned unchanged
/// - object with an `items` array: the array's elements
/// - object with a non-array `items`: empty
/// - any other object: a single-element list
/// - string: parsed as JSON, then the rules above apply once; a string that
///   does not parse, or parses to another string, yields an empty list
/// - null, number, bool: empty
///
/// An empty result means the upstream payload had no recognizable shape.
pub fn normalize_hypotheses(payload: &Value) -> Vec<Value> {
    match payload {
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::String(_)) | Err(_) => Vec::new(),
            Ok(parsed) => normalize_structured(&parsed),
        },
        other => normalize_structured(other),
    }
}

fn normalize_structured(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get(ITEMS_KEY) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => Vec::new(),
            None => vec![payload.clone()],
        },
        _ => Vec::new(),
    }
}

/// Stable identifier for the n-th (0-based) hypothesis of a run.
pub fn hypothesis_subject(index: usize) -> String {
    format!("hypothesis-{}", index + 1)
}
