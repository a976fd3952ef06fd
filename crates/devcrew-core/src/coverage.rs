//! Coverage and requirements checks
//!
//! After a successful apply, the working tree is checked against the
//! Architect's obligations (Gate 6) and the extracted requirements are
//! checked by keyword overlap against the plan and the changed files
//! (Gate 7). The overlap heuristic is conservative: false negatives are
//! acceptable, false positives are not.

use std::path::Path;

use walkdir::WalkDir;

use crate::changes::{function_exists, selector_exists};
use crate::config::defaults;
use crate::plan::ArchitectPlan;
use crate::requirements::{Requirement, keyword_set};

/// Missing obligations found by the coverage walk
#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub functions: Vec<String>,
    pub css_selectors: Vec<String>,
    pub test_files: Vec<String>,
    pub required_files: Vec<String>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.functions.is_empty()
            && self.css_selectors.is_empty()
            && self.test_files.is_empty()
            && self.required_files.is_empty()
    }
}

/// Walk the working tree and report every unmet plan obligation
pub fn check_coverage(root: &Path, plan: &ArchitectPlan) -> CoverageReport {
    let mut report = CoverageReport::default();

    let js_sources = read_sources(root, "js");
    for function in &plan.functions {
        if !js_sources.iter().any(|src| function_exists(src, function)) {
            report.functions.push(function.clone());
        }
    }

    let css_sources = read_sources(root, "css");
    for selector in &plan.selectors {
        if !css_sources.iter().any(|src| selector_exists(src, selector)) {
            report.css_selectors.push(selector.clone());
        }
    }

    for test_file in &plan.test_files {
        if !root.join(test_file).exists() {
            report.test_files.push(test_file.clone());
        }
    }
    for file in &plan.files {
        if !root.join(file).exists() {
            report.required_files.push(file.clone());
        }
    }

    report
}

/// Requirements unsatisfied by the plan text plus the changed files.
///
/// A requirement is satisfied when at least `defaults::REQUIREMENT_OVERLAP`
/// of its keywords appear in the combined text; requirements with no usable
/// keywords count as satisfied rather than blocking forever.
pub fn check_requirements(
    requirements: &[Requirement],
    plan_text: &str,
    changed_contents: &[String],
) -> Vec<String> {
    let mut combined = plan_text.to_lowercase();
    for content in changed_contents {
        combined.push('\n');
        combined.push_str(&content.to_lowercase());
    }
    let haystack = keyword_set(&combined);

    requirements
        .iter()
        .filter(|requirement| {
            if requirement.keywords.is_empty() {
                return false;
            }
            let matched = requirement
                .keywords
                .iter()
                .filter(|keyword| haystack.contains(*keyword))
                .count();
            (matched as f64 / requirement.keywords.len() as f64) < defaults::REQUIREMENT_OVERLAP
        })
        .map(|requirement| requirement.text.clone())
        .collect()
}

/// Contents of the changed files, for the requirements check
pub fn read_changed_contents(
    root: &Path,
    changed: &std::collections::BTreeSet<String>,
) -> Vec<String> {
    changed
        .iter()
        .filter_map(|path| std::fs::read_to_string(root.join(path)).ok())
        .collect()
}

fn read_sources(root: &Path, extension: &str) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|name| name != ".git" && name != "node_modules")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(extension))
        })
        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
        .collect()
}
