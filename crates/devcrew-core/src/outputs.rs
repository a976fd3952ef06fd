//! Structured agent outputs
//!
//! Agents emit text; the payloads the gates depend on (the auditor's
//! `ContextAudit`, the reviewer's `ReviewGate`) are parsed into typed records
//! here at the boundary and never re-inspected by string search afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The Context Auditor's verdict on whether the bundled context is usable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextAudit {
    #[serde(default)]
    pub canonical_files_present: BTreeMap<String, bool>,
    #[serde(default)]
    pub dom_ids: Vec<String>,
    #[serde(default)]
    pub css_selectors: Vec<String>,
    #[serde(default)]
    pub js_functions_or_anchors: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub missing: Vec<String>,
}

/// A quoted identifier the auditor found, with its source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub file: String,
}

impl ContextAudit {
    /// Valid iff nothing is missing and every canonical file was seen
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.canonical_files_present.values().all(|present| *present)
    }

    /// Human-readable reasons the audit failed
    pub fn failures(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .canonical_files_present
            .iter()
            .filter(|(_, present)| !**present)
            .map(|(path, _)| format!("canonical file not found in context: {path}"))
            .collect();
        reasons.extend(self.missing.iter().map(|m| format!("missing: {m}")));
        reasons
    }
}

/// The Reviewer's verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewGate {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub failed_requirements: Vec<String>,
    #[serde(default)]
    pub failed_integration_checks: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Parse the auditor's output
pub fn parse_audit(text: &str) -> Result<ContextAudit> {
    parse_payload(text, "context audit")
}

/// Parse the reviewer's output
pub fn parse_review(text: &str) -> Result<ReviewGate> {
    parse_payload(text, "review gate")
}

fn parse_payload<T: serde::de::DeserializeOwned>(text: &str, what: &str) -> Result<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| Error::Provider(format!("no JSON object in {what} output")))?;
    serde_json::from_str(json)
        .map_err(|e| Error::Provider(format!("malformed {what} JSON: {e}")))
}

/// Find the first balanced JSON object (or array) in free-form agent text.
///
/// Handles fenced code blocks and prose around the payload; string contents
/// are skipped so braces inside them do not confuse the balance.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
