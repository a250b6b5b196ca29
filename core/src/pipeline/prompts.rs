use crate::config::EnhancementKind;
use crate::provider::GenerateOptions;
use crate::request::Request;

/// Longest draft excerpt forwarded to the meta-block prompt.
const META_DRAFT_CHARS: usize = 4_000;

fn request_brief(request: &Request) -> String {
    let mut out = format!(
        "Subject: {}\nContent type: {}\n",
        request.subject(),
        request.content_type()
    );
    if let Some(k) = request.keyword() {
        out.push_str(&format!("Target keyword: {k}\n"));
    }
    let opts = request.options();
    out.push_str(&format!("Minimum length: {} words\n", opts.min_words));
    if let Some(tone) = &opts.tone {
        out.push_str(&format!("Tone: {tone}\n"));
    }
    if let Some(audience) = &opts.audience {
        out.push_str(&format!("Audience: {audience}\n"));
    }
    for (k, v) in &opts.extra {
        out.push_str(&format!("{k}: {v}\n"));
    }
    out
}

pub fn foundation(request: &Request) -> (String, GenerateOptions) {
    let prompt = format!(
        "{}\nWrite the complete piece in Markdown with headings.",
        request_brief(request)
    );
    let options = GenerateOptions {
        system: Some("You write accurate, well-structured web content.".to_string()),
        ..GenerateOptions::default()
    };
    (prompt, options)
}

pub fn enhancement(kind: EnhancementKind, request: &Request, base: &str) -> (String, GenerateOptions) {
    match kind {
        EnhancementKind::Body => (
            format!(
                "{}\nImprove the draft below. Return only the revised Markdown.\n\n---\n{base}",
                request_brief(request)
            ),
            GenerateOptions {
                system: Some("You are a careful editor.".to_string()),
                ..GenerateOptions::default()
            },
        ),
        EnhancementKind::Metadata => (
            format!(
                "{}\nReturn a JSON object of metadata for the draft below \
                 (for example title, description, tags).\n\n---\n{base}",
                request_brief(request)
            ),
            GenerateOptions {
                json: true,
                ..GenerateOptions::default()
            },
        ),
    }
}

pub fn meta_block(request: &Request, draft: &str) -> (String, GenerateOptions) {
    let excerpt: String = draft.chars().take(META_DRAFT_CHARS).collect();
    (
        format!(
            "{}\nReturn a JSON object with \"meta_title\" and \"meta_description\" \
             for the page below.\n\n---\n{excerpt}",
            request_brief(request)
        ),
        GenerateOptions {
            json: true,
            max_tokens: Some(512),
            ..GenerateOptions::default()
        },
    )
}
