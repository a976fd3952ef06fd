//! Configuration for the Devcrew pipeline
//!
//! A single `Config` value is built from the environment at startup and
//! passed explicitly to every component; nothing reads the environment after
//! construction.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::issue::SubIssueStrategy;
use crate::provider::ProviderKind;

/// Default constants used throughout the pipeline
pub mod defaults {
    /// Per-call timeout for language-model invocations, in seconds
    pub const LLM_TIMEOUT_SECS: u64 = 1200;

    /// Retries after a failed language-model call (transport or timeout)
    pub const LLM_RETRIES: u32 = 2;

    /// First backoff delay between model retries, in seconds (doubles per retry)
    pub const LLM_BACKOFF_SECS: u64 = 5;

    /// Per-invocation timeout for git commands, in seconds
    pub const GIT_TIMEOUT_SECS: u64 = 60;

    /// Per-call timeout for forge and board HTTP requests, in seconds
    pub const HTTP_TIMEOUT_SECS: u64 = 30;

    /// Timeout for the detected test command, in seconds
    pub const TEST_TIMEOUT_SECS: u64 = 300;

    /// Total Developer invocations per run (one initial pass plus two retries)
    pub const MAX_DEVELOPER_ATTEMPTS: u32 = 3;

    /// Branches the pipeline must never write on
    pub const PROTECTED_BRANCHES: &[&str] = &["main", "master", "development"];

    /// Character cap on the bundled context slice handed to agents
    pub const CONTEXT_PROMPT_CAP: usize = 10_000;

    /// Head-bounded bytes loaded from each sampled (non-canonical) file
    pub const SAMPLE_HEAD_BYTES: usize = 1_500;

    /// Maximum number of sampled files in the context bundle
    pub const MAX_SAMPLED_FILES: usize = 20;

    /// Bullets taken from the issue body when no structured section exists
    pub const FALLBACK_BULLET_CAP: usize = 15;

    /// Allowlist entries shown in agent prompts, canonical files first
    pub const ALLOWLIST_PROMPT_ENTRIES: usize = 40;

    /// Minimum keyword overlap for a requirement to count as satisfied
    pub const REQUIREMENT_OVERLAP: f64 = 0.5;

    /// Default project-board column names
    pub const IN_PROGRESS_COLUMN: &str = "In Progress";
    pub const DONE_COLUMN: &str = "Done";

    /// Persistent set of already-handled issue numbers
    pub const PROCESSED_FILE: &str = "data/processed_issues.json";

    /// Patch artifact written after a complete run
    pub const PATCH_FILE: &str = "crewai_patch.diff";

    /// Per-issue run reports directory (relative to the working tree)
    pub const PLAN_DIR: &str = "implementations";

    /// Default models per provider
    pub const OLLAMA_MODEL: &str = "qwen2.5-coder:14b";
    pub const OPENAI_MODEL: &str = "gpt-4o";
}

/// Runtime configuration, constructed once from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Forge API token; required for any forge or board operation
    pub forge_token: Option<String>,
    /// Default `owner/repo` when the CLI does not name one
    pub default_repo: Option<String>,
    /// Base directory holding the target working tree
    pub work_dir: PathBuf,

    /// Selected model provider
    pub provider: ProviderKind,
    /// Per-provider base URLs and model names
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_base_url: Option<String>,
    pub openai_model: String,
    /// Per-call model timeout in seconds
    pub llm_timeout_secs: u64,

    /// Push the feature branch after a complete run
    pub auto_push: bool,
    /// Move the issue across board columns during the run
    pub move_in_pipeline: bool,
    pub in_progress_column: String,
    pub done_column: String,

    /// Pull sub-issues into processing
    pub process_sub_issues: bool,
    pub sub_issue_strategy: SubIssueStrategy,

    /// Run the Tester stage after a successful apply
    pub enable_testing: bool,
    /// Kept recognized so stale telemetry endpoints can never stall a run
    pub otel_sdk_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            forge_token: None,
            default_repo: None,
            work_dir: PathBuf::from("."),
            provider: ProviderKind::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: defaults::OLLAMA_MODEL.to_string(),
            openai_base_url: None,
            openai_model: defaults::OPENAI_MODEL.to_string(),
            llm_timeout_secs: defaults::LLM_TIMEOUT_SECS,
            auto_push: false,
            move_in_pipeline: false,
            in_progress_column: defaults::IN_PROGRESS_COLUMN.to_string(),
            done_column: defaults::DONE_COLUMN.to_string(),
            process_sub_issues: false,
            sub_issue_strategy: SubIssueStrategy::Include,
            enable_testing: true,
            otel_sdk_disabled: true,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// Only the enumerated variable names are recognized; anything else in
    /// the environment is ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        config.forge_token = env_var("GITHUB_TOKEN");
        config.default_repo = env_var("DEFAULT_REPO");
        if let Some(dir) = env_var("WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }

        if let Some(provider) = env_var("MODEL_PROVIDER") {
            config.provider = ProviderKind::from_str(&provider)
                .map_err(|e| Error::Config(format!("MODEL_PROVIDER: {e}")))?;
        }
        if let Some(url) = env_var("OLLAMA_BASE_URL") {
            config.ollama_base_url = url;
        }
        if let Some(model) = env_var("OLLAMA_MODEL") {
            config.ollama_model = model;
        }
        config.openai_base_url = env_var("OPENAI_BASE_URL");
        if let Some(model) = env_var("OPENAI_MODEL") {
            config.openai_model = model;
        }
        if let Some(secs) = env_var("LLM_TIMEOUT_SECS") {
            config.llm_timeout_secs = secs
                .parse()
                .map_err(|_| Error::Config(format!("LLM_TIMEOUT_SECS is not a number: {secs}")))?;
        }

        config.auto_push = env_bool("AUTO_PUSH", config.auto_push);
        config.move_in_pipeline = env_bool("MOVE_IN_PIPELINE", config.move_in_pipeline);
        if let Some(column) = env_var("PIPELINE_IN_PROGRESS_COLUMN") {
            config.in_progress_column = column;
        }
        if let Some(column) = env_var("PIPELINE_DONE_COLUMN") {
            config.done_column = column;
        }

        config.process_sub_issues = env_bool("PROCESS_SUB_ISSUES", config.process_sub_issues);
        if let Some(strategy) = env_var("SUB_ISSUE_STRATEGY") {
            config.sub_issue_strategy = SubIssueStrategy::from_str(&strategy)
                .map_err(|e| Error::Config(format!("SUB_ISSUE_STRATEGY: {e}")))?;
        }

        config.enable_testing = env_bool("ENABLE_TESTING", config.enable_testing);
        config.otel_sdk_disabled = env_bool("OTEL_SDK_DISABLED", config.otel_sdk_disabled);

        Ok(config)
    }

    /// Model name for the selected provider
    pub fn model_name(&self) -> &str {
        match self.provider {
            ProviderKind::Ollama => &self.ollama_model,
            ProviderKind::OpenAi => &self.openai_model,
        }
    }

    /// The forge token, or a configuration error naming it
    pub fn require_forge_token(&self) -> Result<&str> {
        self.forge_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Config("GITHUB_TOKEN is not set".to_string()))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean environment variable; unset keeps the default.
fn env_bool(name: &str, default: bool) -> bool {
    match env_var(name) {
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}
