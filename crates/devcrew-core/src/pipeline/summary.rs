//! Summary emitter and plan-file rendering
//!
//! Every claim in the summary is keyed to a boolean in `RunState`; nothing
//! is reported as done on assumption. The plan file is the full run report:
//! agent outputs, the structured change record, gate outcomes, and (on
//! success) the patch.

use crate::issue::Issue;

use super::state::RunState;
use super::{RunReport, StageOutputs};

/// Two-section report: local work, then forge/git operations
pub fn render_summary(issue: &Issue, state: &RunState, changed_files: &[String]) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Issue #{}: {}\n\n", issue.number, issue.title));

    out.push_str("## Local implementation and testing\n");
    if state.applied_ok {
        if changed_files.is_empty() {
            out.push_str("- Changes applied: yes (working tree already matched; no files modified)\n");
        } else {
            out.push_str(&format!("- Changes applied: yes ({} files)\n", changed_files.len()));
            for file in changed_files {
                out.push_str(&format!("  - {file}\n"));
            }
        }
    } else {
        out.push_str("- Changes applied: no\n");
    }
    out.push_str(&format!(
        "- All gates passed: {}\n",
        if state.coverage_ok { "yes" } else { "no" }
    ));
    if let Some(reason) = &state.missing.failure_reason {
        out.push_str(&format!("- Failed at: {reason}\n"));
    }
    if !state.missing.is_empty() {
        out.push_str("- Outstanding items:\n");
        for line in state.missing.checklist().lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }

    out.push_str("\n## Forge and git operations\n");
    out.push_str(&format!(
        "- Commit created: {}\n",
        if state.did_commit { "yes" } else { "no" }
    ));
    if state.did_commit {
        out.push_str(&format!(
            "  - {} -> {}\n",
            short(&state.head_sha_before),
            short(&state.head_sha_after)
        ));
    }
    out.push_str(&format!(
        "- Pushed to origin: {}\n",
        if state.did_push { "yes" } else { "no" }
    ));
    out.push_str(&format!(
        "- Board moved to done: {}\n",
        if state.did_move_done { "yes" } else { "no" }
    ));
    if !state.current_branch.is_empty() {
        out.push_str(&format!("- Branch: {}\n", state.current_branch));
    }

    if !state.errors.is_empty() {
        out.push_str("\n## Errors and warnings\n");
        for error in &state.errors {
            out.push_str(&format!("- {error}\n"));
        }
    }

    out
}

/// Full run report written to `implementations/issue_<N>_plan.md`
pub fn render_plan_file(issue: &Issue, report: &RunReport, outputs: &StageOutputs) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# Run report for issue #{}: {}\n\n",
        issue.number, issue.title
    ));
    out.push_str(&format!(
        "Run {} started {}\nOutcome: {}\n\n",
        report.state.run_id,
        report.state.started_at.to_rfc3339(),
        if report.complete { "complete" } else { "incomplete" }
    ));

    out.push_str(&render_summary(issue, &report.state, &report.changed_files));

    let mut stage = |title: &str, body: &Option<String>| {
        if let Some(body) = body {
            out.push_str(&format!("\n## {title}\n\n{body}\n"));
        }
    };
    stage("Product Manager", &outputs.product);
    stage("Context Auditor", &outputs.audit);
    stage("Software Architect", &outputs.architecture);
    stage("Developer change set", &outputs.changes);
    stage("Reviewer", &outputs.review);
    stage("Tester", &outputs.tests);

    if let Some(patch) = &report.patch {
        if !patch.trim().is_empty() {
            out.push_str("\n## Patch\n\n```diff\n");
            out.push_str(patch);
            if !patch.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
    }

    out
}

fn short(sha: &str) -> &str {
    if sha.len() >= 8 { &sha[..8] } else { sha }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::Gate;

    #[test]
    fn summary_never_claims_unset_flags() {
        let issue = Issue::new(3, "title", "");
        let state = RunState::new();
        let summary = render_summary(&issue, &state, &[]);
        assert!(summary.contains("Changes applied: no"));
        assert!(summary.contains("Commit created: no"));
        assert!(summary.contains("Pushed to origin: no"));
        assert!(summary.contains("Board moved to done: no"));
    }

    #[test]
    fn summary_reports_shas_only_with_commit() {
        let issue = Issue::new(3, "title", "");
        let mut state = RunState::new();
        state.mark_applied();
        state.mark_coverage_ok();
        state.mark_committed();
        state.head_sha_before = "aaaaaaaaaaaa".to_string();
        state.head_sha_after = "bbbbbbbbbbbb".to_string();

        let summary = render_summary(&issue, &state, &["app.js".to_string()]);
        assert!(summary.contains("Commit created: yes"));
        assert!(summary.contains("aaaaaaaa -> bbbbbbbb"));
        assert!(summary.contains("app.js"));
    }

    #[test]
    fn summary_lists_gate_failure_and_checklist() {
        let issue = Issue::new(3, "title", "");
        let mut state = RunState::new();
        state.missing.functions.push("handleClear".to_string());
        state.record_gate_failure(Gate::Coverage, "1 function missing");

        let summary = render_summary(&issue, &state, &[]);
        assert!(summary.contains("Failed at: coverage gate"));
        assert!(summary.contains("handleClear"));
    }
}
