//! Prompt composition
//!
//! Each agent gets a fixed role/goal/backstory as its system prompt and a
//! task description binding the bundled context, the requirement checklist,
//! the path allowlist, the forbidden prefixes, and every prior agent's
//! output. The Developer's task additionally carries the change-schema
//! contract and, on retry, the missing-item checklist.

use crate::allowlist::PathAllowlist;
use crate::changes::{DIFF_MARKERS, FORBIDDEN_PLACEHOLDERS};
use crate::config::defaults;
use crate::issue::Issue;
use crate::requirements::Requirement;

/// The fixed agent sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    ProductManager,
    ContextAuditor,
    Architect,
    Developer,
    Reviewer,
    Tester,
}

impl AgentRole {
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::ProductManager => "Product Manager",
            AgentRole::ContextAuditor => "Context Auditor",
            AgentRole::Architect => "Software Architect",
            AgentRole::Developer => "Developer",
            AgentRole::Reviewer => "Reviewer",
            AgentRole::Tester => "Tester",
        }
    }

    fn goal(&self) -> &'static str {
        match self {
            AgentRole::ProductManager => {
                "Turn the issue into a crisp user story with scoped acceptance criteria"
            }
            AgentRole::ContextAuditor => {
                "Verify the provided repository context is sufficient before any code is planned"
            }
            AgentRole::Architect => {
                "Produce the smallest file-change plan that satisfies the acceptance criteria"
            }
            AgentRole::Developer => {
                "Emit a valid JSON change set that implements the plan exactly"
            }
            AgentRole::Reviewer => {
                "Reject any change set that misses a requirement or breaks integration"
            }
            AgentRole::Tester => "Run the repository's test command against the applied changes",
        }
    }

    fn backstory(&self) -> &'static str {
        match self {
            AgentRole::ProductManager => {
                "A pragmatic PM who scopes ruthlessly and writes testable criteria."
            }
            AgentRole::ContextAuditor => {
                "A skeptic who only trusts identifiers quoted verbatim from real files."
            }
            AgentRole::Architect => {
                "A frontend architect who prefers the smallest diff that can possibly work."
            }
            AgentRole::Developer => {
                "A careful engineer who outputs machine-readable changes, never prose."
            }
            AgentRole::Reviewer => {
                "A reviewer with zero tolerance for placeholders and unverified claims."
            }
            AgentRole::Tester => "An integration tester who believes only passing runs.",
        }
    }

    /// System prompt: role, goal, backstory
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {role} of a software delivery team.\nGoal: {goal}.\nBackstory: {backstory}",
            role = self.name(),
            goal = self.goal(),
            backstory = self.backstory()
        )
    }
}

/// Everything the composer binds into task descriptions
pub struct PromptContext<'a> {
    pub issue: &'a Issue,
    pub context_text: &'a str,
    pub requirements: &'a [Requirement],
    pub allowlist: &'a PathAllowlist,
}

impl PromptContext<'_> {
    fn issue_block(&self) -> String {
        format!(
            "# Issue #{number}: {title}\n\n{body}",
            number = self.issue.number,
            title = self.issue.title,
            body = self.issue.body
        )
    }

    fn requirements_block(&self) -> String {
        if self.requirements.is_empty() {
            return "(no structured acceptance criteria were found)".to_string();
        }
        self.requirements
            .iter()
            .map(|r| format!("- {}", r.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn allowlist_block(&self) -> String {
        let entries = self
            .allowlist
            .prompt_entries(defaults::ALLOWLIST_PROMPT_ENTRIES);
        let mut block = entries
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prefixes = self.allowlist.forbidden_prefixes();
        if !prefixes.is_empty() {
            block.push_str("\n\nForbidden path prefixes (never touch):\n");
            block.push_str(
                &prefixes
                    .iter()
                    .map(|p| format!("- {p}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        block
    }

    /// Product Manager: user story, scoped criteria, out-of-scope, risks
    pub fn product_manager_task(&self) -> String {
        format!(
            "{issue}\n\n## Extracted acceptance criteria\n{requirements}\n\n## Repository context\n{context}\n\n\
             Write:\n\
             1. A one-paragraph user story.\n\
             2. Scoped acceptance criteria (keep only what this issue needs).\n\
             3. An explicit out-of-scope list.\n\
             4. Risks worth flagging to the team.",
            issue = self.issue_block(),
            requirements = self.requirements_block(),
            context = self.context_text,
        )
    }

    /// Context Auditor: strict JSON audit of the bundled context
    pub fn auditor_task(&self, product_output: &str) -> String {
        let canonical = self
            .allowlist
            .prompt_entries(defaults::ALLOWLIST_PROMPT_ENTRIES)
            .first()
            .cloned()
            .unwrap_or_default();
        format!(
            "{issue}\n\n## Product Manager output\n{product}\n\n## Repository context\n{context}\n\n\
             Audit the context above. Quote only identifiers you can see verbatim.\n\
             Respond with a single JSON object and nothing else:\n\
             {{\n\
               \"canonical_files_present\": {{\"{canonical}\": true}},\n\
               \"dom_ids\": [],\n\
               \"css_selectors\": [],\n\
               \"js_functions_or_anchors\": [],\n\
               \"evidence\": [{{\"identifier\": \"\", \"quote\": \"\", \"file\": \"\"}}],\n\
               \"missing\": []\n\
             }}\n\
             List in \"missing\" anything the Developer would need that the context does not show.",
            issue = self.issue_block(),
            product = product_output,
            context = self.context_text,
        )
    }

    /// Architect: minimal plan quoting audited identifiers
    pub fn architect_task(&self, product_output: &str, audit_output: &str) -> String {
        format!(
            "{issue}\n\n## Product Manager output\n{product}\n\n## Context audit\n{audit}\n\n\
             ## Allowed files\n{allowlist}\n\n## Repository context\n{context}\n\n\
             Produce the minimal change plan. Quote identifiers from the audit in backticks.\n\
             Use exactly these sections:\n\
             ### New Functions\n### Files to Change\n### Test Approach\n\
             Keep the plan small; every item becomes a verified obligation.",
            issue = self.issue_block(),
            product = product_output,
            audit = audit_output,
            allowlist = self.allowlist_block(),
            context = self.context_text,
        )
    }

    /// Developer: the JSON change-set contract, plus retry feedback when set
    pub fn developer_task(&self, architect_output: &str, retry_feedback: Option<&str>) -> String {
        let mut task = format!(
            "{issue}\n\n## Architect plan\n{plan}\n\n## Allowed files\n{allowlist}\n\n\
             ## Repository context\n{context}\n\n\
             Respond with a single JSON object, no prose:\n\
             {{\"changes\": [ ... ], \"notes\": \"...\"}}\n\n\
             Rules for every change:\n\
             - Include \"path\" and \"operation\".\n\
             - Operations: create, replace_file, upsert_function_js, upsert_css_selector, \
               insert_after_anchor, insert_before_anchor, append_if_missing, edit, delete.\n\
             - upsert_function_js requires \"function_name\"; upsert_css_selector requires \"selector\"; \
               insert_*_anchor requires \"anchor\"; append_if_missing requires \"signature\"; \
               edit requires \"edits\": [{{\"find\": \"...\", \"replace\": \"...\"}}].\n\
             - Only paths from the allowed list; never a forbidden prefix.\n\
             - Never emit unified diffs ({diff_markers}).\n\
             - Never leave placeholders ({placeholders}).\n\
             - Do not introduce new runtime dependencies.",
            issue = self.issue_block(),
            plan = architect_output,
            allowlist = self.allowlist_block(),
            context = self.context_text,
            diff_markers = DIFF_MARKERS.join(", "),
            placeholders = FORBIDDEN_PLACEHOLDERS.join(", "),
        );
        if let Some(feedback) = retry_feedback {
            task.push_str(
                "\n\n## Previous attempt was incomplete\nFix every item below, keeping what already worked:\n",
            );
            task.push_str(feedback);
        }
        task
    }

    /// Reviewer: strict JSON verdict against requirements and the plan
    pub fn reviewer_task(&self, architect_output: &str, developer_output: &str) -> String {
        format!(
            "{issue}\n\n## Acceptance criteria\n{requirements}\n\n## Architect plan\n{plan}\n\n\
             ## Developer change set\n{changes}\n\n\
             Check every acceptance criterion and every integration point (IDs, selectors, anchors)\n\
             against the change set. Respond with a single JSON object and nothing else:\n\
             {{\"pass\": true, \"failed_requirements\": [], \"failed_integration_checks\": [], \"notes\": \"\"}}\n\
             Set \"pass\" to false if anything at all is missing.",
            issue = self.issue_block(),
            requirements = self.requirements_block(),
            plan = architect_output,
            changes = developer_output,
        )
    }
}
