//! Run state
//!
//! The single source of truth for a run's gate-cascade outcomes. Owned and
//! mutated only by the orchestrator; flags move forward only (no field ever
//! transitions true back to false).

use serde::Serialize;

/// The seven gates, in cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gate {
    Context,
    ContextAudit,
    Review,
    Validation,
    PostApply,
    Coverage,
    Requirements,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Gate::Context => "context gate",
            Gate::ContextAudit => "context audit gate",
            Gate::Review => "review gate",
            Gate::Validation => "validation gate",
            Gate::PostApply => "post-apply gate",
            Gate::Coverage => "coverage gate",
            Gate::Requirements => "requirements gate",
        };
        write!(f, "{name}")
    }
}

/// Categorized missing items, concatenated into the retry checklist
#[derive(Debug, Clone, Default, Serialize)]
pub struct Missing {
    pub functions: Vec<String>,
    pub css_selectors: Vec<String>,
    pub test_files: Vec<String>,
    pub required_files: Vec<String>,
    pub validation_errors: Vec<String>,
    pub unsatisfied_requirements: Vec<String>,
    #[serde(rename = "_failure_reason")]
    pub failure_reason: Option<String>,
    #[serde(rename = "_failure_summary")]
    pub failure_summary: Option<String>,
}

impl Missing {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.css_selectors.is_empty()
            && self.test_files.is_empty()
            && self.required_files.is_empty()
            && self.validation_errors.is_empty()
            && self.unsatisfied_requirements.is_empty()
    }

    /// Human-readable checklist handed back to the Developer on retry
    pub fn checklist(&self) -> String {
        let mut lines = Vec::new();
        let mut section = |title: &str, items: &[String]| {
            if !items.is_empty() {
                lines.push(format!("{title}:"));
                for item in items {
                    lines.push(format!("- {item}"));
                }
            }
        };
        section("Missing functions", &self.functions);
        section("Missing CSS selectors", &self.css_selectors);
        section("Missing test files", &self.test_files);
        section("Missing required files", &self.required_files);
        section("Validation errors", &self.validation_errors);
        section("Unsatisfied requirements", &self.unsatisfied_requirements);
        lines.join("\n")
    }

    /// Reset the categories a fresh Developer attempt re-derives, keeping
    /// nothing stale in the next checklist.
    pub fn clear_attempt_scoped(&mut self) {
        self.functions.clear();
        self.css_selectors.clear();
        self.test_files.clear();
        self.required_files.clear();
        self.validation_errors.clear();
        self.unsatisfied_requirements.clear();
    }
}

/// Append-only record of one run's outcomes
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub applied_ok: bool,
    pub coverage_ok: bool,
    pub did_commit: bool,
    pub did_push: bool,
    pub did_move_done: bool,
    pub errors: Vec<String>,
    pub current_branch: String,
    pub head_sha_before: String,
    pub head_sha_after: String,
    pub missing: Missing,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
            applied_ok: false,
            coverage_ok: false,
            did_commit: false,
            did_push: false,
            did_move_done: false,
            errors: Vec::new(),
            current_branch: String::new(),
            head_sha_before: String::new(),
            head_sha_after: String::new(),
            missing: Missing::default(),
        }
    }

    /// Record an error string, preserving order
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Record a gate failure: reason plus summary, never unsetting flags
    pub fn record_gate_failure(&mut self, gate: Gate, summary: impl Into<String>) {
        let summary = summary.into();
        self.missing.failure_reason = Some(gate.to_string());
        self.missing.failure_summary = Some(summary.clone());
        self.record_error(format!("{gate} failed: {summary}"));
    }

    // Forward-only flag setters

    pub fn mark_applied(&mut self) {
        self.applied_ok = true;
    }

    pub fn mark_coverage_ok(&mut self) {
        self.coverage_ok = true;
    }

    pub fn mark_committed(&mut self) {
        self.did_commit = true;
    }

    pub fn mark_pushed(&mut self) {
        self.did_push = true;
    }

    pub fn mark_moved_done(&mut self) {
        self.did_move_done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_concatenates_all_categories() {
        let missing = Missing {
            functions: vec!["handleClear".to_string()],
            css_selectors: vec![".clear-btn".to_string()],
            validation_errors: vec!["change 1: missing path".to_string()],
            ..Default::default()
        };
        let checklist = missing.checklist();
        assert!(checklist.contains("Missing functions:"));
        assert!(checklist.contains("- handleClear"));
        assert!(checklist.contains("Missing CSS selectors:"));
        assert!(checklist.contains("Validation errors:"));
        assert!(!checklist.contains("Missing test files:"));
    }

    #[test]
    fn empty_missing_has_empty_checklist() {
        let missing = Missing::default();
        assert!(missing.is_empty());
        assert!(missing.checklist().is_empty());
    }

    #[test]
    fn clear_attempt_scoped_keeps_failure_fields() {
        let mut missing = Missing {
            functions: vec!["f".to_string()],
            failure_reason: Some("coverage gate".to_string()),
            ..Default::default()
        };
        missing.clear_attempt_scoped();
        assert!(missing.is_empty());
        assert_eq!(missing.failure_reason.as_deref(), Some("coverage gate"));
    }

    #[test]
    fn gate_failure_records_reason_and_error() {
        let mut state = RunState::new();
        state.record_gate_failure(Gate::Coverage, "2 functions missing");
        assert_eq!(state.missing.failure_reason.as_deref(), Some("coverage gate"));
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("coverage gate"));
        assert!(!state.coverage_ok);
    }
}
