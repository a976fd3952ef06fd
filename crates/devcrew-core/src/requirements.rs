//! Requirement extraction
//!
//! Parses acceptance criteria and definition-of-done bullets out of an issue
//! body into a deterministic checklist. Each requirement carries a keyword
//! set used later by the requirements gate.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::config::defaults;

/// Words ignored when deriving a requirement's keyword set
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "of", "in", "on", "for", "with", "is", "are", "be",
    "that", "this", "it", "as", "at", "by", "from", "should", "when", "all", "any",
];

/// One extracted acceptance criterion
#[derive(Debug, Clone, Serialize)]
pub struct Requirement {
    pub text: String,
    pub keywords: BTreeSet<String>,
}

impl Requirement {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let keywords = keyword_set(&text);
        Self { text, keywords }
    }
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s{0,3}(?:#{1,6}\s*|\*\*)?\s*(acceptance criteria|definition of done|requirements|ac|dod)\b",
        )
        .expect("static regex")
    })
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*]\s+\[[ xX]\]|[-*]|\[[ xX]\]|\d+[.)])\s+(.+)$").expect("static regex")
    })
}

fn any_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s{0,3}#{1,6}\s+\S").expect("static regex"))
}

/// Extract requirements from an issue title and body.
///
/// Bullets under recognized headings win; with no structured section the
/// first bullets anywhere in the body are used. Ordering matches the
/// document; empty input yields an empty list.
pub fn extract(_title: &str, body: &str) -> Vec<Requirement> {
    let lines: Vec<&str> = body.lines().collect();
    let mut requirements = Vec::new();
    let mut in_section = false;

    for line in &lines {
        if heading_re().is_match(line) {
            in_section = true;
            continue;
        }
        if in_section {
            if any_heading_re().is_match(line) {
                in_section = false;
                continue;
            }
            if let Some(capture) = bullet_re().captures(line) {
                let text = capture[1].trim().to_string();
                if !text.is_empty() {
                    requirements.push(Requirement::new(text));
                }
            }
        }
    }

    if requirements.is_empty() {
        for line in &lines {
            if let Some(capture) = bullet_re().captures(line) {
                let text = capture[1].trim().to_string();
                if !text.is_empty() {
                    requirements.push(Requirement::new(text));
                }
            }
            if requirements.len() >= defaults::FALLBACK_BULLET_CAP {
                break;
            }
        }
    }

    requirements
}

/// Lowercased non-stopword tokens of a text
pub fn keyword_set(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| token.len() > 1 && !STOPWORDS.contains(&token.as_str()))
        .collect()
}

/// Lowercase tokens split on non-alphanumerics
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
