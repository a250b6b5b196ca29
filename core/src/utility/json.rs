use serde_json::{Map, Value};

/// Parses a provider reply that should contain one JSON object.
///
/// Tolerates surrounding prose and Markdown code fences by taking the span
/// from the first `{` to the last `}`.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, String> {
    let start = text.find('{').ok_or_else(|| "no JSON object found".to_string())?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| "unterminated JSON object".to_string())?;

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected object, got {}", type_name(&other))),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
