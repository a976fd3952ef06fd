//! Devcrew CLI - automated issue resolution pipeline
//!
//! Usage:
//!   devcrew <owner/repo> [<max_issues> | <max_issues> <issue_number>] [--openai]
//!
//! Exit codes: 0 when every processed issue completed, 1 on fatal
//! configuration errors, 2 when the pipeline ended incomplete.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use devcrew_core::config::{Config, defaults};
use devcrew_core::forge::{BoardClient, ForgeClient};
use devcrew_core::issue::{Issue, SubIssueStrategy};
use devcrew_core::pipeline::Pipeline;
use devcrew_core::proc::SystemRunner;
use devcrew_core::processed::ProcessedIssues;
use devcrew_core::provider::{GenAiModel, ProviderKind};
use devcrew_forge::{GithubClient, ProjectsBoard};

#[derive(Parser)]
#[command(name = "devcrew")]
#[command(version)]
#[command(about = "Resolve bug-tracker issues with a multi-agent pipeline", long_about = None)]
struct Cli {
    /// Target repository as owner/repo (falls back to DEFAULT_REPO)
    repo: Option<String>,

    /// Batch mode: process up to this many unprocessed issues
    max_issues: Option<usize>,

    /// Single-issue mode: with max_issues = 1, process exactly this issue,
    /// bypassing the processed set
    issue_number: Option<u64>,

    /// Use the remote OpenAI provider instead of the default local provider
    #[arg(long, alias = "force-openai")]
    openai: bool,

    /// Working directory holding the target checkout (overrides WORK_DIR)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "devcrew=debug" } else { "devcrew=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Returns whether every processed issue completed
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = Config::from_env().context("invalid environment configuration")?;
    if cli.openai {
        config.provider = ProviderKind::OpenAi;
    }

    let repo = cli
        .repo
        .clone()
        .or_else(|| config.default_repo.clone())
        .context("no repository given and DEFAULT_REPO is not set")?;

    let token = config
        .require_forge_token()
        .context("a forge token is required")?
        .to_string();

    let root = resolve_working_tree(&cli, &config, &repo);
    if !root.is_dir() {
        bail!("working tree does not exist: {}", root.display());
    }
    info!(repo = %repo, root = %root.display(), provider = %config.provider, "starting");

    let forge: Arc<dyn ForgeClient> = Arc::new(GithubClient::new(token.clone())?);
    let board: Option<Arc<dyn BoardClient>> = if config.move_in_pipeline {
        Some(Arc::new(ProjectsBoard::new(token)?))
    } else {
        None
    };
    let model = Arc::new(GenAiModel::new(&config));
    let runner = Arc::new(SystemRunner);

    let mut pipeline = Pipeline::new(config.clone(), model, runner, repo.clone(), root)
        .with_forge(forge.clone());
    if let Some(board) = board {
        pipeline = pipeline.with_board(board);
    }

    let mut processed = ProcessedIssues::load(defaults::PROCESSED_FILE)?;

    // Single-issue mode bypasses the processed set
    if let (Some(1), Some(number)) = (cli.max_issues, cli.issue_number) {
        let issue = forge.fetch_issue(&repo, number).await?;
        let complete = run_one(&pipeline, &mut processed, &issue).await?;
        return Ok(complete);
    }
    if cli.issue_number.is_some() {
        bail!("an issue number requires max_issues = 1");
    }

    // Batch mode
    let max_issues = cli.max_issues.unwrap_or(1);
    let open_issues = forge.list_open_issues(&repo).await?;
    let pending: Vec<Issue> = open_issues
        .into_iter()
        .filter(|issue| !processed.contains(issue.number))
        .take(max_issues)
        .collect();
    if pending.is_empty() {
        info!("no unprocessed open issues");
        return Ok(true);
    }

    let mut all_complete = true;
    for issue in pending {
        let complete = run_one(&pipeline, &mut processed, &issue).await?;
        all_complete &= complete;

        if complete
            && config.process_sub_issues
            && config.sub_issue_strategy == SubIssueStrategy::Sequential
        {
            for sub in forge.list_sub_issues(&repo, &issue).await? {
                if processed.contains(sub.number) {
                    continue;
                }
                all_complete &= run_one(&pipeline, &mut processed, &sub).await?;
            }
        }
    }
    Ok(all_complete)
}

async fn run_one(
    pipeline: &Pipeline,
    processed: &mut ProcessedIssues,
    issue: &Issue,
) -> anyhow::Result<bool> {
    info!(number = issue.number, title = %issue.title, "processing issue");
    let report = pipeline.run(issue).await?;
    println!("{}", report.summary);
    if let Some(plan_path) = &report.plan_path {
        info!(plan = %plan_path.display(), "run report written");
    }
    if report.complete {
        processed.mark(issue.number)?;
    } else {
        warn!(number = issue.number, "run ended incomplete");
    }
    Ok(report.complete)
}

/// The target checkout: an explicit workspace wins; otherwise WORK_DIR, with
/// a `<work_dir>/<repo-name>` subdirectory preferred when it exists.
fn resolve_working_tree(cli: &Cli, config: &Config, repo: &str) -> PathBuf {
    if let Some(workspace) = &cli.workspace {
        return workspace.clone();
    }
    let repo_name = repo.rsplit('/').next().unwrap_or(repo);
    let nested = config.work_dir.join(repo_name);
    if nested.is_dir() {
        nested
    } else {
        config.work_dir.clone()
    }
}
