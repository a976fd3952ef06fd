//! The run orchestrator
//!
//! Drives the agent sequence PM → Auditor → Architect → Developer →
//! Reviewer (→ Tester), enforces the seven-gate cascade, applies structured
//! changes, and performs the post-apply actions. Strictly sequential: each
//! stage consumes the prior stage's output, and `RunState` is the only
//! mutable state crossing stage boundaries.

pub mod state;
pub mod summary;
pub mod tester;

pub use state::{Gate, Missing, RunState};
pub use tester::{TestCommand, TestOutcome, detect_test_command, run_tests};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::allowlist::PathAllowlist;
use crate::changes::{self, Applier, ApplyOutcome};
use crate::config::{Config, defaults};
use crate::context::ContextBundler;
use crate::coverage;
use crate::error::Result;
use crate::forge::{BoardClient, ForgeClient};
use crate::issue::{Issue, SubIssueStrategy};
use crate::outputs;
use crate::plan::{self, ArchitectPlan};
use crate::prompt::{AgentRole, PromptContext};
use crate::proc::CommandRunner;
use crate::provider::ModelClient;
use crate::repo::RepoKind;
use crate::requirements::{self, Requirement};
use crate::vcs::GitWorkspace;

/// Raw agent outputs, kept for the plan file
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    pub product: Option<String>,
    pub audit: Option<String>,
    pub architecture: Option<String>,
    pub changes: Option<String>,
    pub review: Option<String>,
    pub tests: Option<String>,
}

/// Final report of one run
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub complete: bool,
    pub changed_files: Vec<String>,
    pub patch: Option<String>,
    pub summary: String,
    pub plan_path: Option<PathBuf>,
}

enum AttemptOutcome {
    Complete(ApplyOutcome),
    Retry,
    Abort,
}

/// One pipeline bound to one working tree
pub struct Pipeline {
    config: Config,
    model: Arc<dyn ModelClient>,
    runner: Arc<dyn CommandRunner>,
    forge: Option<Arc<dyn ForgeClient>>,
    board: Option<Arc<dyn BoardClient>>,
    repo: String,
    root: PathBuf,
}

impl Pipeline {
    pub fn new(
        config: Config,
        model: Arc<dyn ModelClient>,
        runner: Arc<dyn CommandRunner>,
        repo: impl Into<String>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            model,
            runner,
            forge: None,
            board: None,
            repo: repo.into(),
            root: root.into(),
        }
    }

    pub fn with_forge(mut self, forge: Arc<dyn ForgeClient>) -> Self {
        self.forge = Some(forge);
        self
    }

    pub fn with_board(mut self, board: Arc<dyn BoardClient>) -> Self {
        self.board = Some(board);
        self
    }

    /// Run the full pipeline for one issue.
    ///
    /// Fatal configuration problems (inaccessible tree, failed branch
    /// checkout) return `Err`; gate failures return an incomplete report.
    pub async fn run(&self, issue: &Issue) -> Result<RunReport> {
        let mut run_state = RunState::new();
        let mut stage_outputs = StageOutputs::default();

        let kind = RepoKind::detect(&self.root)?;

        // Gate 1: canonical files must exist and be non-empty, before any
        // agent runs. No plan file is written for a misconfigured tree.
        let bundle = ContextBundler::new(&self.root, kind.clone()).bundle()?;
        if bundle.manifest.is_fatal() {
            let summary_text = bundle.manifest.fatal_errors.join("; ");
            for error in &bundle.manifest.fatal_errors {
                run_state.missing.validation_errors.push(error.clone());
            }
            run_state.record_gate_failure(Gate::Context, summary_text);
            return Ok(self.finish(issue, run_state, &stage_outputs, false, None, false, Vec::new()));
        }

        self.move_board(issue, &self.config.in_progress_column.clone(), &mut run_state, false)
            .await;

        // Branch safety before anything can write
        let git = GitWorkspace::new(&self.root, self.runner.clone());
        let branch = git
            .ensure_feature_branch(&issue.branch_name(), defaults::PROTECTED_BRANCHES)
            .await?;
        run_state.current_branch = branch;
        run_state.head_sha_before = git.head_sha().await.unwrap_or_default();

        let effective = self.effective_issue(issue).await;
        let issue_requirements = requirements::extract(&effective.title, &effective.body);
        let allowlist = PathAllowlist::snapshot(&self.root, &kind)?;
        let prompts = PromptContext {
            issue: &effective,
            context_text: &bundle.text,
            requirements: &issue_requirements,
            allowlist: &allowlist,
        };

        // Product Manager
        let product = match self.invoke_agent(AgentRole::ProductManager, &prompts.product_manager_task()).await {
            Ok(text) => text,
            Err(e) => {
                run_state.record_error(format!("product manager stage failed: {e}"));
                return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
            }
        };
        stage_outputs.product = Some(product.clone());

        // Context Auditor + Gate 2
        let audit_text = match self.invoke_agent(AgentRole::ContextAuditor, &prompts.auditor_task(&product)).await {
            Ok(text) => text,
            Err(e) => {
                run_state.record_error(format!("context auditor stage failed: {e}"));
                return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
            }
        };
        stage_outputs.audit = Some(audit_text.clone());
        match outputs::parse_audit(&audit_text) {
            Ok(audit) if audit.is_clean() => {}
            Ok(audit) => {
                let failures = audit.failures();
                run_state.missing.validation_errors.extend(failures.clone());
                run_state.record_gate_failure(Gate::ContextAudit, failures.join("; "));
                return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
            }
            Err(e) => {
                run_state.record_gate_failure(Gate::ContextAudit, format!("unparseable audit: {e}"));
                return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
            }
        }

        // Software Architect
        let architecture = match self.invoke_agent(AgentRole::Architect, &prompts.architect_task(&product, &audit_text)).await {
            Ok(text) => text,
            Err(e) => {
                run_state.record_error(format!("architect stage failed: {e}"));
                return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
            }
        };
        stage_outputs.architecture = Some(architecture.clone());
        let architect_plan = plan::parse(&architecture);

        // Developer/Reviewer/apply loop, bounded by the retry budget
        let mut retry_feedback: Option<String> = None;
        let mut apply_outcome: Option<ApplyOutcome> = None;

        for attempt in 1..=defaults::MAX_DEVELOPER_ATTEMPTS {
            run_state.missing.clear_attempt_scoped();
            info!(attempt, "developer attempt");

            let outcome = self
                .developer_attempt(
                    &prompts,
                    &architecture,
                    &architect_plan,
                    &issue_requirements,
                    &kind,
                    &allowlist,
                    retry_feedback.as_deref(),
                    &mut run_state,
                    &mut stage_outputs,
                )
                .await;

            match outcome {
                Ok(AttemptOutcome::Complete(applied)) => {
                    apply_outcome = Some(applied);
                    break;
                }
                Ok(AttemptOutcome::Retry) => {
                    if attempt < defaults::MAX_DEVELOPER_ATTEMPTS {
                        let checklist = run_state.missing.checklist();
                        warn!(attempt, "attempt incomplete, retrying with checklist");
                        retry_feedback = Some(checklist);
                    }
                }
                Ok(AttemptOutcome::Abort) => {
                    return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
                }
                Err(e) => {
                    run_state.record_error(format!("developer stage failed: {e}"));
                    return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
                }
            }
        }

        let Some(applied) = apply_outcome else {
            // Retry budget exhausted
            return Ok(self.finish(issue, run_state, &stage_outputs, false, None, true, Vec::new()));
        };

        run_state.mark_applied();
        run_state.mark_coverage_ok();

        let patch = self.post_apply_actions(issue, &applied, &mut run_state).await;
        let changed_files: Vec<String> = applied.changed_files.iter().cloned().collect();
        Ok(self.finish(issue, run_state, &stage_outputs, true, patch, true, changed_files))
    }

    /// One Developer → Reviewer → apply → verify pass (Gates 3 through 7)
    #[allow(clippy::too_many_arguments)]
    async fn developer_attempt(
        &self,
        prompts: &PromptContext<'_>,
        architecture: &str,
        architect_plan: &ArchitectPlan,
        issue_requirements: &[Requirement],
        kind: &RepoKind,
        allowlist: &PathAllowlist,
        retry_feedback: Option<&str>,
        run_state: &mut RunState,
        stage_outputs: &mut StageOutputs,
    ) -> Result<AttemptOutcome> {
        let developer_text = self
            .invoke_agent(
                AgentRole::Developer,
                &prompts.developer_task(architecture, retry_feedback),
            )
            .await?;
        stage_outputs.changes = Some(developer_text.clone());

        // Reviewer + Gate 3 (pre-apply; a rejection ends the run)
        let review_text = self
            .invoke_agent(
                AgentRole::Reviewer,
                &prompts.reviewer_task(architecture, &developer_text),
            )
            .await?;
        stage_outputs.review = Some(review_text.clone());
        match outputs::parse_review(&review_text) {
            Ok(review) if review.pass => {}
            Ok(review) => {
                run_state
                    .missing
                    .unsatisfied_requirements
                    .extend(review.failed_requirements.clone());
                run_state
                    .missing
                    .validation_errors
                    .extend(review.failed_integration_checks.clone());
                run_state.record_gate_failure(
                    Gate::Review,
                    format!("reviewer rejected the change set: {}", review.notes),
                );
                return Ok(AttemptOutcome::Abort);
            }
            Err(e) => {
                run_state.record_gate_failure(Gate::Review, format!("unparseable review: {e}"));
                return Ok(AttemptOutcome::Abort);
            }
        }

        // Gate 4: schema + path + content validation, all-or-nothing
        let raw_set = match changes::parse_changeset(&developer_text) {
            Ok(set) => set,
            Err(e) => {
                run_state.missing.validation_errors.push(e.to_string());
                run_state.record_gate_failure(Gate::Validation, e.to_string());
                return Ok(AttemptOutcome::Retry);
            }
        };
        let validation = changes::validate(&raw_set, &self.root, allowlist, kind);
        if !validation.is_valid() {
            run_state
                .missing
                .validation_errors
                .extend(validation.errors.clone());
            run_state.record_gate_failure(
                Gate::Validation,
                format!("{} validation errors", validation.errors.len()),
            );
            return Ok(AttemptOutcome::Retry);
        }

        // Gate 4, application half: atomic, rolls itself back on failure
        let applier = Applier::new(&self.root);
        let applied = match applier.apply(&validation.changes) {
            Ok(outcome) => outcome,
            Err(e) => {
                run_state.missing.validation_errors.push(e.to_string());
                run_state.record_gate_failure(Gate::Validation, e.to_string());
                return Ok(AttemptOutcome::Retry);
            }
        };

        // Gate 5: re-scan written files for placeholders
        let placeholder_hits = changes::scan_placeholders(
            &self.root,
            &applied.changed_files,
            &kind.forbidden_dependency_markers(),
        );
        if !placeholder_hits.is_empty() {
            run_state
                .missing
                .validation_errors
                .extend(placeholder_hits.clone());
            run_state.record_gate_failure(
                Gate::PostApply,
                format!("{} placeholder hits after apply", placeholder_hits.len()),
            );
            applier.restore(&applied.snapshot);
            return Ok(AttemptOutcome::Retry);
        }

        // Gate 6: coverage walk against the architect's obligations
        let coverage_report = coverage::check_coverage(&self.root, architect_plan);
        if !coverage_report.is_complete() {
            run_state.missing.functions = coverage_report.functions;
            run_state.missing.css_selectors = coverage_report.css_selectors;
            run_state.missing.test_files = coverage_report.test_files;
            run_state.missing.required_files = coverage_report.required_files;
            run_state.record_gate_failure(Gate::Coverage, "plan obligations missing from tree");
            applier.restore(&applied.snapshot);
            return Ok(AttemptOutcome::Retry);
        }

        // Tester stage, between coverage and requirements
        if self.config.enable_testing {
            match run_tests(&self.root, self.runner.as_ref()).await? {
                TestOutcome::Skipped => {
                    stage_outputs.tests = Some("no test command detected".to_string());
                }
                TestOutcome::Passed { command } => {
                    stage_outputs.tests = Some(format!("passed: {command}"));
                }
                TestOutcome::Failed { command, detail } => {
                    stage_outputs.tests = Some(format!("failed: {command}\n{detail}"));
                    run_state
                        .missing
                        .validation_errors
                        .push(format!("test command failed ({command}): {detail}"));
                    run_state.record_gate_failure(Gate::Coverage, format!("tests failed: {command}"));
                    applier.restore(&applied.snapshot);
                    return Ok(AttemptOutcome::Retry);
                }
            }
        }

        // Gate 7: every acceptance criterion must be addressed
        let changed_contents = coverage::read_changed_contents(&self.root, &applied.changed_files);
        let unsatisfied =
            coverage::check_requirements(issue_requirements, &architect_plan.raw, &changed_contents);
        if !unsatisfied.is_empty() {
            run_state.missing.unsatisfied_requirements = unsatisfied;
            run_state.record_gate_failure(Gate::Requirements, "acceptance criteria unsatisfied");
            applier.restore(&applied.snapshot);
            return Ok(AttemptOutcome::Retry);
        }

        Ok(AttemptOutcome::Complete(applied))
    }

    /// Commit, patch artifact, push, board transition, completion comment.
    /// Only reached when every gate passed; failures here are warnings.
    async fn post_apply_actions(
        &self,
        issue: &Issue,
        applied: &ApplyOutcome,
        run_state: &mut RunState,
    ) -> Option<String> {
        let git = GitWorkspace::new(&self.root, self.runner.clone());
        let mut patch = None;

        let tree_dirty = git.has_changes().await.unwrap_or(false);
        if applied.changed_files.is_empty() && !tree_dirty {
            info!("no changes to commit");
        } else {
            let message = format!("Resolve issue #{}: {}", issue.number, issue.title);
            match git.commit_all(&message).await {
                Ok(sha) => {
                    run_state.head_sha_after = sha;
                    run_state.mark_committed();
                    match git.diff_patch(&run_state.head_sha_before).await {
                        Ok(diff) => {
                            if let Err(e) =
                                std::fs::write(self.root.join(defaults::PATCH_FILE), &diff)
                            {
                                run_state.record_error(format!("cannot write patch artifact: {e}"));
                            }
                            patch = Some(diff);
                        }
                        Err(e) => run_state.record_error(format!("patch generation failed: {e}")),
                    }
                }
                Err(e) => run_state.record_error(format!("commit failed: {e}")),
            }

            if self.config.auto_push && run_state.did_commit {
                match git.push(&run_state.current_branch).await {
                    Ok(()) => run_state.mark_pushed(),
                    Err(e) => run_state.record_error(format!("push failed (run stays complete): {e}")),
                }
            }
        }

        self.move_board(issue, &self.config.done_column.clone(), run_state, true)
            .await;

        if let Some(forge) = &self.forge {
            let comment = format!(
                "Automated pipeline completed for issue #{} on branch `{}`.",
                issue.number, run_state.current_branch
            );
            if let Err(e) = forge.post_comment(&self.repo, issue.number, &comment).await {
                run_state.record_error(format!("completion comment failed: {e}"));
            }
        }

        patch
    }

    /// Board transitions are warnings, never errors
    async fn move_board(&self, issue: &Issue, column: &str, run_state: &mut RunState, is_done: bool) {
        if !self.config.move_in_pipeline {
            return;
        }
        let Some(board) = &self.board else {
            return;
        };
        match board.move_issue(&self.repo, issue.number, column).await {
            Ok(()) => {
                if is_done {
                    run_state.mark_moved_done();
                }
            }
            Err(e) => {
                warn!(column, error = %e, "board transition failed");
                run_state.record_error(format!("board transition to '{column}' failed: {e}"));
            }
        }
    }

    async fn invoke_agent(&self, role: AgentRole, task: &str) -> Result<String> {
        info!(stage = role.name(), model = self.model.model(), "invoking agent");
        self.model.invoke(&role.system_prompt(), task).await
    }

    /// Concatenate sub-issue bodies under the `include` strategy
    async fn effective_issue(&self, issue: &Issue) -> Issue {
        if !self.config.process_sub_issues
            || self.config.sub_issue_strategy != SubIssueStrategy::Include
        {
            return issue.clone();
        }
        let Some(forge) = &self.forge else {
            return issue.clone();
        };
        match forge.list_sub_issues(&self.repo, issue).await {
            Ok(sub_issues) if !sub_issues.is_empty() => {
                let mut combined = issue.clone();
                for sub in sub_issues {
                    combined.body.push_str(&format!(
                        "\n\n## Sub-issue #{}: {}\n{}",
                        sub.number, sub.title, sub.body
                    ));
                    combined.sub_issues.push(sub.number);
                }
                combined
            }
            Ok(_) => issue.clone(),
            Err(e) => {
                warn!(error = %e, "sub-issue fetch failed, using parent only");
                issue.clone()
            }
        }
    }

    /// Assemble the report, optionally writing the plan file
    fn finish(
        &self,
        issue: &Issue,
        run_state: RunState,
        stage_outputs: &StageOutputs,
        complete: bool,
        patch: Option<String>,
        write_plan: bool,
        changed_files: Vec<String>,
    ) -> RunReport {
        let mut report = RunReport {
            summary: String::new(),
            state: run_state,
            complete,
            changed_files,
            patch,
            plan_path: None,
        };
        report.summary = summary::render_summary(issue, &report.state, &report.changed_files);

        if write_plan {
            let plan_dir = self.root.join(defaults::PLAN_DIR);
            let plan_path = plan_dir.join(format!("issue_{}_plan.md", issue.number));
            let rendered = summary::render_plan_file(issue, &report, stage_outputs);
            if std::fs::create_dir_all(&plan_dir).is_ok()
                && std::fs::write(&plan_path, rendered).is_ok()
            {
                report.plan_path = Some(plan_path);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{CommandOutput, ScriptedRunner};
    use crate::provider::MockModel;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct MockBoard {
        moves: Mutex<Vec<String>>,
    }

    impl MockBoard {
        fn new() -> Self {
            Self {
                moves: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BoardClient for MockBoard {
        async fn move_issue(&self, _repo: &str, _number: u64, column: &str) -> Result<()> {
            self.moves.lock().push(column.to_string());
            Ok(())
        }
    }

    fn frontend_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<header>\n</header>\n").unwrap();
        std::fs::write(dir.path().join("styles.css"), ".header {\n  color: red;\n}\n").unwrap();
        std::fs::write(dir.path().join("app.js"), "function init() {\n  render();\n}\n").unwrap();
        dir
    }

    fn scripted_git() -> Arc<ScriptedRunner> {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git branch --show-current", CommandOutput::ok("main\n"));
        runner.respond("git rev-parse HEAD", CommandOutput::ok("abc123\n"));
        runner
    }

    fn issue() -> Issue {
        Issue::new(
            7,
            "Add a Clear button",
            "## Acceptance Criteria\n- Add a 'Clear' button to the header\n",
        )
    }

    fn clean_audit() -> String {
        json!({
            "canonical_files_present": {"index.html": true, "styles.css": true, "app.js": true},
            "dom_ids": ["clear-btn"],
            "css_selectors": [".header"],
            "js_functions_or_anchors": ["init"],
            "evidence": [],
            "missing": []
        })
        .to_string()
    }

    fn architect_plan() -> String {
        "Add a clear button to the header and wire it up.\n\n\
         ### New Functions\n- `handleClear()`\n\n\
         ### Files to Change\n- index.html\n- app.js\n\n\
         ### Test Approach\nManual verification in the browser.\n"
            .to_string()
    }

    fn good_changeset() -> String {
        json!({
            "changes": [
                {
                    "operation": "upsert_function_js",
                    "path": "app.js",
                    "function_name": "handleClear",
                    "content": "function handleClear() {\n  list.innerHTML = '';\n}"
                },
                {
                    "operation": "insert_after_anchor",
                    "path": "index.html",
                    "anchor": "<header>",
                    "content": "<button id=\"clear-btn\">Clear</button>"
                }
            ],
            "notes": "adds the clear button and its handler"
        })
        .to_string()
    }

    fn passing_review() -> String {
        json!({"pass": true, "failed_requirements": [], "failed_integration_checks": [], "notes": "ok"})
            .to_string()
    }

    fn queue_through_architect(model: &MockModel) {
        model.push("User story: a visitor clears the list from the header.");
        model.push(clean_audit());
        model.push(architect_plan());
    }

    fn pipeline(dir: &tempfile::TempDir, model: Arc<MockModel>, runner: Arc<ScriptedRunner>) -> Pipeline {
        Pipeline::new(Config::default(), model, runner, "owner/repo", dir.path())
    }

    #[tokio::test]
    async fn happy_path_applies_commits_and_reports() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        model.push(good_changeset());
        model.push(passing_review());
        let runner = scripted_git();

        let report = pipeline(&dir, model.clone(), runner.clone())
            .run(&issue())
            .await
            .unwrap();

        assert!(report.complete, "{}", report.summary);
        assert!(report.state.applied_ok);
        assert!(report.state.coverage_ok);
        assert!(report.state.did_commit);
        assert_eq!(report.state.current_branch, "feature/issue-7");
        assert_eq!(report.changed_files, vec!["app.js", "index.html"]);

        // Branch safety ran before the commit
        assert!(runner.saw("git checkout -B feature/issue-7"));
        assert!(runner.saw("git commit"));

        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(html.contains("clear-btn"));
        assert!(dir.path().join("crewai_patch.diff").exists());
        assert!(dir.path().join("implementations/issue_7_plan.md").exists());
        assert!(report.summary.contains("Commit created: yes"));
    }

    #[tokio::test]
    async fn rerun_is_idempotent_with_no_new_commit() {
        let dir = frontend_tree();

        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        model.push(good_changeset());
        model.push(passing_review());
        let first = pipeline(&dir, model, scripted_git()).run(&issue()).await.unwrap();
        assert!(first.complete);

        // Same issue again: the tree already matches, so zero changed files,
        // the coverage gate still passes, and no commit is created.
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        model.push(good_changeset());
        model.push(passing_review());
        let runner = scripted_git();
        let second = pipeline(&dir, model, runner.clone()).run(&issue()).await.unwrap();

        assert!(second.complete, "{}", second.summary);
        assert!(second.changed_files.is_empty());
        assert!(!second.state.did_commit);
        assert!(!runner.saw("git commit"));
    }

    #[tokio::test]
    async fn missing_canonical_file_fails_gate_one_before_agents() {
        let dir = frontend_tree();
        std::fs::remove_file(dir.path().join("app.js")).unwrap();
        let model = Arc::new(MockModel::new());
        let runner = scripted_git();

        let report = pipeline(&dir, model.clone(), runner.clone())
            .run(&issue())
            .await
            .unwrap();

        assert!(!report.complete);
        assert_eq!(
            report.state.missing.failure_reason.as_deref(),
            Some("context gate")
        );
        // No agent ran, no plan file was written, the tree was untouched
        assert!(model.invocations().is_empty());
        assert!(report.plan_path.is_none());
        assert!(!dir.path().join("implementations").exists());
        assert!(!runner.saw("git commit"));
    }

    #[tokio::test]
    async fn placeholder_injection_retries_then_ends_incomplete() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        let bad = json!({
            "changes": [{
                "operation": "replace_file",
                "path": "app.js",
                "content": "// TODO: implement"
            }]
        })
        .to_string();
        for _ in 0..3 {
            model.push(bad.clone());
            model.push(passing_review());
        }
        let runner = scripted_git();

        let report = pipeline(&dir, model.clone(), runner.clone())
            .run(&issue())
            .await
            .unwrap();

        assert!(!report.complete);
        assert!(!report.state.applied_ok);
        assert!(!runner.saw("git commit"));
        assert!(
            report
                .state
                .missing
                .validation_errors
                .iter()
                .any(|e| e.contains("todo")),
            "{:?}",
            report.state.missing.validation_errors
        );

        // Exactly three Developer invocations, and the retries carried the
        // missing-item checklist
        let invocations = model.invocations();
        let developer_tasks: Vec<&(String, String)> = invocations
            .iter()
            .filter(|(system, _)| system.contains("Developer"))
            .collect();
        assert_eq!(developer_tasks.len(), 3);
        assert!(developer_tasks[1].1.contains("Previous attempt was incomplete"));
        assert!(developer_tasks[1].1.contains("todo"));

        // The original file survived untouched
        let js = std::fs::read_to_string(dir.path().join("app.js")).unwrap();
        assert!(js.contains("function init()"));
    }

    #[tokio::test]
    async fn absolute_path_is_rejected_without_writing() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        let bad = json!({
            "changes": [{
                "operation": "replace_file",
                "path": "/etc/hosts",
                "content": "owned"
            }]
        })
        .to_string();
        for _ in 0..3 {
            model.push(bad.clone());
            model.push(passing_review());
        }

        let report = pipeline(&dir, model, scripted_git()).run(&issue()).await.unwrap();

        assert!(!report.complete);
        assert!(
            report
                .state
                .missing
                .validation_errors
                .iter()
                .any(|e| e.contains("absolute")),
            "{:?}",
            report.state.missing.validation_errors
        );
    }

    #[tokio::test]
    async fn missing_anchor_fails_apply_and_feeds_retry() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        let bad = json!({
            "changes": [{
                "operation": "insert_after_anchor",
                "path": "index.html",
                "anchor": "<nav>",
                "content": "<button>Clear</button>"
            }]
        })
        .to_string();
        for _ in 0..3 {
            model.push(bad.clone());
            model.push(passing_review());
        }

        let report = pipeline(&dir, model.clone(), scripted_git())
            .run(&issue())
            .await
            .unwrap();

        assert!(!report.complete);
        let developer_tasks: Vec<(String, String)> = model
            .invocations()
            .into_iter()
            .filter(|(system, _)| system.contains("Developer"))
            .collect();
        assert_eq!(developer_tasks.len(), 3);
        assert!(developer_tasks[2].1.contains("anchor"));
    }

    #[tokio::test]
    async fn reviewer_rejection_aborts_before_apply() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        model.push(good_changeset());
        model.push(
            json!({
                "pass": false,
                "failed_requirements": ["toast is missing"],
                "failed_integration_checks": [],
                "notes": "no toast"
            })
            .to_string(),
        );

        let report = pipeline(&dir, model.clone(), scripted_git())
            .run(&issue())
            .await
            .unwrap();

        assert!(!report.complete);
        assert_eq!(
            report.state.missing.failure_reason.as_deref(),
            Some("review gate")
        );
        assert!(
            report
                .state
                .missing
                .unsatisfied_requirements
                .contains(&"toast is missing".to_string())
        );
        // Nothing was applied
        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(!html.contains("clear-btn"));
    }

    #[tokio::test]
    async fn failed_branch_checkout_is_fatal_before_agents() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git branch --show-current", CommandOutput::ok("main\n"));
        runner.respond("git checkout", CommandOutput::failed("index locked"));

        let err = pipeline(&dir, model.clone(), runner).run(&issue()).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Branch(_)));
        assert!(model.invocations().is_empty());
        // Nothing was written
        let html = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert_eq!(html, "<header>\n</header>\n");
    }

    #[tokio::test]
    async fn board_moves_in_progress_then_done() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        queue_through_architect(&model);
        model.push(good_changeset());
        model.push(passing_review());

        let board = Arc::new(MockBoard::new());
        let mut config = Config::default();
        config.move_in_pipeline = true;
        let pipe = Pipeline::new(config, model, scripted_git(), "owner/repo", dir.path())
            .with_board(board.clone());

        let report = pipe.run(&issue()).await.unwrap();
        assert!(report.complete);
        assert!(report.state.did_move_done);
        assert_eq!(*board.moves.lock(), vec!["In Progress", "Done"]);
    }

    #[tokio::test]
    async fn auditor_missing_items_fail_gate_two_before_any_write() {
        let dir = frontend_tree();
        let model = Arc::new(MockModel::new());
        model.push("User story.");
        model.push(
            json!({
                "canonical_files_present": {"index.html": true},
                "missing": ["the list markup the issue refers to"]
            })
            .to_string(),
        );

        let report = pipeline(&dir, model.clone(), scripted_git())
            .run(&issue())
            .await
            .unwrap();

        assert!(!report.complete);
        assert_eq!(
            report.state.missing.failure_reason.as_deref(),
            Some("context audit gate")
        );
        // Architect and Developer never ran
        assert_eq!(model.invocations().len(), 2);
        assert!(report.plan_path.is_some());
    }
}
