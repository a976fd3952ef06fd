//! Issue model
//!
//! Issues are fetched once from the forge and treated as immutable for the
//! duration of a run.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A bug-tracker issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Parent issue, when this issue is a sub-issue
    #[serde(default)]
    pub parent: Option<u64>,
    /// Sub-issue numbers in document order
    #[serde(default)]
    pub sub_issues: Vec<u64>,
}

impl Issue {
    pub fn new(number: u64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            body: body.into(),
            parent: None,
            sub_issues: Vec::new(),
        }
    }

    /// Feature branch name for this issue
    pub fn branch_name(&self) -> String {
        format!("feature/issue-{}", self.number)
    }
}

/// How sub-issues participate in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubIssueStrategy {
    /// Concatenate sub-issue bodies into the parent's context
    #[default]
    Include,
    /// Run each sub-issue as its own pipeline pass after the parent
    Sequential,
    /// Ignore sub-issues entirely
    Skip,
}

impl FromStr for SubIssueStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(SubIssueStrategy::Include),
            "sequential" => Ok(SubIssueStrategy::Sequential),
            "skip" => Ok(SubIssueStrategy::Skip),
            other => Err(format!("unknown sub-issue strategy: {other}")),
        }
    }
}

/// Extract `#N` issue references from a body, in document order, deduplicated.
///
/// Used when the forge has no native sub-issue API.
pub fn parse_issue_refs(body: &str, exclude: u64) -> Vec<u64> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    let re = regex::Regex::new(r"#(\d+)\b").expect("static regex");
    for capture in re.captures_iter(body) {
        if let Ok(number) = capture[1].parse::<u64>() {
            if number != exclude && seen.insert(number) {
                refs.push(number);
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_embeds_number() {
        let issue = Issue::new(42, "Add clear button", "");
        assert_eq!(issue.branch_name(), "feature/issue-42");
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!(
            SubIssueStrategy::from_str("Include").unwrap(),
            SubIssueStrategy::Include
        );
        assert_eq!(
            SubIssueStrategy::from_str("SEQUENTIAL").unwrap(),
            SubIssueStrategy::Sequential
        );
        assert!(SubIssueStrategy::from_str("parallel").is_err());
    }

    #[test]
    fn issue_refs_dedupe_and_keep_order() {
        let body = "Depends on #12 and #7, see also #12 and #9.";
        assert_eq!(parse_issue_refs(body, 0), vec![12, 7, 9]);
    }

    #[test]
    fn issue_refs_exclude_self() {
        assert_eq!(parse_issue_refs("Tracking #5 in #5 itself, plus #6", 5), vec![6]);
    }
}
