use serde_json::{json, Map, Value};

use crate::request::{ContentType, Request};

/// Longest description carried into the JSON-LD block.
const DESCRIPTION_CHARS: usize = 160;

/// Builds a schema.org JSON-LD block for the draft.
///
/// The `@type` follows the request's content type. FAQ pages also get a
/// `mainEntity` list built from question headings (lines ending in `?`)
/// and the text that follows each.
pub fn build(body: &str, request: &Request, metadata: &Map<String, Value>) -> Value {
    let content_type = request.content_type();
    let headline = metadata
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| title_from_body(body).unwrap_or_else(|| request.subject().to_string()));
    let description = metadata
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| summarize(body, DESCRIPTION_CHARS));

    let mut block = Map::new();
    block.insert("@context".into(), json!("https://schema.org"));
    block.insert("@type".into(), json!(content_type.schema_type()));

    let title_field = match content_type {
        ContentType::Article => "headline",
        ContentType::Guide | ContentType::Faq | ContentType::ServicePage => "name",
    };
    block.insert(title_field.into(), json!(headline));
    block.insert("description".into(), json!(description));

    if let Some(keyword) = request.keyword() {
        block.insert("keywords".into(), json!(keyword));
    }

    match content_type {
        ContentType::Faq => {
            let entities: Vec<Value> = questions(body)
                .into_iter()
                .map(|(q, a)| {
                    json!({
                        "@type": "Question",
                        "name": q,
                        "acceptedAnswer": { "@type": "Answer", "text": a },
                    })
                })
                .collect();
            block.insert("mainEntity".into(), Value::Array(entities));
        }
        ContentType::Guide => {
            let steps: Vec<Value> = headings(body)
                .into_iter()
                .enumerate()
                .map(|(i, h)| json!({ "@type": "HowToStep", "position": i + 1, "name": h }))
                .collect();
            block.insert("step".into(), Value::Array(steps));
        }
        ContentType::ServicePage => {
            block.insert("serviceType".into(), json!(request.subject()));
        }
        ContentType::Article => {
            block.insert("about".into(), json!(request.subject()));
        }
    }

    Value::Object(block)
}

fn heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let stripped = trimmed.trim_start_matches('#');
    if stripped.len() == trimmed.len() || !stripped.starts_with(char::is_whitespace) {
        return None;
    }
    let text = stripped.trim();
    (!text.is_empty()).then_some(text)
}

fn headings(body: &str) -> Vec<String> {
    body.lines().filter_map(heading_text).map(str::to_string).collect()
}

fn title_from_body(body: &str) -> Option<String> {
    body.lines().find_map(heading_text).map(str::to_string)
}

fn summarize(body: &str, max_chars: usize) -> String {
    let text = body
        .lines()
        .filter(|l| heading_text(l).is_none())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}…", &cut[..idx]),
        _ => format!("{cut}…"),
    }
}

fn questions(body: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in body.lines() {
        let text = heading_text(line).unwrap_or(line.trim());
        if text.ends_with('?') {
            if let Some((q, a)) = current.take() {
                out.push((q, a.join(" ")));
            }
            current = Some((text.to_string(), Vec::new()));
        } else if let Some((_, answer)) = current.as_mut() {
            if !text.is_empty() && heading_text(line).is_none() {
                answer.push(text.to_string());
            }
        }
    }
    if let Some((q, a)) = current {
        out.push((q, a.join(" ")));
    }
    out.retain(|(_, a)| !a.is_empty());
    out
}
