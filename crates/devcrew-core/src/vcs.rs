//! Git plumbing for the target working tree
//!
//! Every mutation runs through the `CommandRunner` with the configured git
//! timeout. Patches are always derived from the working tree, never from
//! agent output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::defaults;
use crate::error::{Error, Result};
use crate::proc::{CommandOutput, CommandRunner};

/// Git operations on one working tree
pub struct GitWorkspace {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl GitWorkspace {
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
            timeout: Duration::from_secs(defaults::GIT_TIMEOUT_SECS),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!(args = ?args, "git");
        self.runner.run("git", args, &self.root, self.timeout).await
    }

    async fn git_ok(&self, args: &[&str]) -> Result<String> {
        let out = self.git(args).await?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(Error::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                out.stderr.trim()
            )))
        }
    }

    /// Name of the currently checked-out branch
    pub async fn current_branch(&self) -> Result<String> {
        Ok(self
            .git_ok(&["branch", "--show-current"])
            .await?
            .trim()
            .to_string())
    }

    /// SHA of the current HEAD commit
    pub async fn head_sha(&self) -> Result<String> {
        Ok(self.git_ok(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    /// Move off protected branches before any file write.
    ///
    /// Returns the branch the working tree ends up on. Checkout failure is a
    /// branch-safety error and must abort the run before anything is written.
    pub async fn ensure_feature_branch(
        &self,
        branch: &str,
        protected: &[&str],
    ) -> Result<String> {
        let current = self.current_branch().await?;
        if !protected.contains(&current.as_str()) {
            return Ok(current);
        }

        let out = self.git(&["checkout", "-B", branch]).await?;
        if !out.success() {
            return Err(Error::Branch(format!(
                "cannot leave protected branch {current}: {}",
                out.stderr.trim()
            )));
        }
        info!(from = %current, to = %branch, "switched off protected branch");
        Ok(branch.to_string())
    }

    /// Whether the working tree has uncommitted changes (staged or not)
    pub async fn has_changes(&self) -> Result<bool> {
        Ok(!self
            .git_ok(&["status", "--porcelain"])
            .await?
            .trim()
            .is_empty())
    }

    /// Stage everything and commit; returns the new commit SHA
    pub async fn commit_all(&self, message: &str) -> Result<String> {
        self.git_ok(&["add", "-A"]).await?;
        self.git_ok(&["commit", "-m", message]).await?;
        self.head_sha().await
    }

    /// Push the branch to origin
    pub async fn push(&self, branch: &str) -> Result<()> {
        self.git_ok(&["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    /// Unified diff of the working tree's HEAD against a base commit
    pub async fn diff_patch(&self, base_sha: &str) -> Result<String> {
        self.git_ok(&["diff", base_sha, "HEAD"]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ScriptedRunner;

    fn workspace(runner: Arc<ScriptedRunner>) -> GitWorkspace {
        GitWorkspace::new("/tmp/does-not-matter", runner)
    }

    #[tokio::test]
    async fn ensure_feature_branch_moves_off_protected() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git branch --show-current", CommandOutput::ok("main\n"));
        let git = workspace(runner.clone());

        let branch = git
            .ensure_feature_branch("feature/issue-7", defaults::PROTECTED_BRANCHES)
            .await
            .unwrap();
        assert_eq!(branch, "feature/issue-7");
        assert!(runner.saw("git checkout -B feature/issue-7"));
    }

    #[tokio::test]
    async fn ensure_feature_branch_keeps_unprotected() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git branch --show-current", CommandOutput::ok("feature/issue-7\n"));
        let git = workspace(runner.clone());

        let branch = git
            .ensure_feature_branch("feature/issue-7", defaults::PROTECTED_BRANCHES)
            .await
            .unwrap();
        assert_eq!(branch, "feature/issue-7");
        assert!(!runner.saw("git checkout"));
    }

    #[tokio::test]
    async fn ensure_feature_branch_fails_when_checkout_fails() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git branch --show-current", CommandOutput::ok("master\n"));
        runner.respond("git checkout", CommandOutput::failed("index locked"));
        let git = workspace(runner);

        let err = git
            .ensure_feature_branch("feature/issue-7", defaults::PROTECTED_BRANCHES)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Branch(_)));
    }

    #[tokio::test]
    async fn commit_all_returns_head_sha() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git rev-parse HEAD", CommandOutput::ok("abc123\n"));
        let git = workspace(runner.clone());

        let sha = git.commit_all("fix: something").await.unwrap();
        assert_eq!(sha, "abc123");
        assert!(runner.saw("git add -A"));
        assert!(runner.saw("git commit -m fix: something"));
    }

    #[tokio::test]
    async fn has_changes_reads_porcelain_status() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git status --porcelain", CommandOutput::ok(" M app.js\n"));
        assert!(workspace(runner).has_changes().await.unwrap());

        let clean = Arc::new(ScriptedRunner::new());
        clean.respond("git status --porcelain", CommandOutput::ok("\n"));
        assert!(!workspace(clean).has_changes().await.unwrap());
    }
}
