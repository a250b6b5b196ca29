use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::request::Request;

static HEADING_REGEX: OnceLock<Regex> = OnceLock::new();
static WORD_REGEX: OnceLock<Regex> = OnceLock::new();

fn heading_regex() -> &'static Regex {
    HEADING_REGEX.get_or_init(|| {
        Regex::new(r"(?m)^\s{0,3}#{1,6}\s+\S|(?i)<h[1-6][\s>]").expect("HEADING_REGEX is valid")
    })
}

fn word_regex() -> &'static Regex {
    WORD_REGEX.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+(?:['’-][\p{L}\p{N}]+)*").expect("WORD_REGEX is valid"))
}

/// Acceptable keyword density band, in percent of body words.
const DENSITY_MIN: f64 = 0.5;
const DENSITY_MAX: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// 0-100, share of applicable checks that passed.
    pub score: f64,
    pub word_count: usize,
    pub checks: Vec<ComplianceCheck>,
}

/// Structural and keyword checks over a draft body.
///
/// Keyword checks are skipped (not failed) when the request has no keyword.
pub fn check(body: &str, request: &Request) -> ComplianceReport {
    let words = words(body);
    let word_count = words.len();
    let min_words = request.options().min_words;
    let mut checks = Vec::new();

    checks.push(ComplianceCheck {
        name: "min_words".to_string(),
        passed: word_count >= min_words,
        detail: format!("{word_count} words, minimum {min_words}"),
    });

    let headings = heading_regex().find_iter(body).count();
    checks.push(ComplianceCheck {
        name: "headings".to_string(),
        passed: headings > 0,
        detail: format!("{headings} heading(s)"),
    });

    if let Some(keyword) = request.keyword() {
        let needle = keyword.to_lowercase();
        let lower = body.to_lowercase();
        let occurrences = lower.matches(&needle).count();

        checks.push(ComplianceCheck {
            name: "keyword_in_body".to_string(),
            passed: occurrences > 0,
            detail: format!("'{keyword}' appears {occurrences} time(s)"),
        });

        let first = first_paragraph(body).to_lowercase();
        checks.push(ComplianceCheck {
            name: "keyword_in_first_paragraph".to_string(),
            passed: first.contains(&needle),
            detail: format!("first paragraph has {} words", words_in(&first)),
        });

        let keyword_words = words_in(keyword).max(1);
        let density = if word_count == 0 {
            0.0
        } else {
            (occurrences * keyword_words) as f64 * 100.0 / word_count as f64
        };
        checks.push(ComplianceCheck {
            name: "keyword_density".to_string(),
            passed: (DENSITY_MIN..=DENSITY_MAX).contains(&density),
            detail: format!("{density:.2}% (target {DENSITY_MIN}-{DENSITY_MAX}%)"),
        });
    }

    let passed = checks.iter().filter(|c| c.passed).count();
    let score = (passed as f64 * 1000.0 / checks.len() as f64).round() / 10.0;

    ComplianceReport {
        score,
        word_count,
        checks,
    }
}

fn words(text: &str) -> Vec<&str> {
    word_regex().find_iter(text).map(|m| m.as_str()).collect()
}

fn words_in(text: &str) -> usize {
    word_regex().find_iter(text).count()
}

/// First non-heading, non-blank block of text.
fn first_paragraph(body: &str) -> &str {
    body.split("\n\n")
        .map(str::trim)
        .find(|block| !block.is_empty() && !heading_regex().is_match(block))
        .unwrap_or("")
}
