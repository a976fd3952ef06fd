//! Subprocess runner
//!
//! All git plumbing and test execution goes through the `CommandRunner`
//! trait, so the pipeline can be exercised in tests with a scripted runner.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands with a per-invocation timeout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput>;
}

/// Real subprocess execution via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let result = tokio::time::timeout(timeout, command.output()).await;

        match result {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout(timeout.as_secs())),
        }
    }
}

/// Scripted runner for tests
///
/// Responses are matched by command-line prefix (`"git commit"` matches
/// `git commit -m ...`); the first match wins, later registrations shadow
/// earlier ones for the same prefix. Unmatched invocations succeed with
/// empty output so incidental plumbing never fails a test.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the output returned for command lines starting with `prefix`
    pub fn respond(&self, prefix: impl Into<String>, output: CommandOutput) {
        self.rules.lock().insert(0, (prefix.into(), output));
    }

    /// Full command lines seen so far
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// Whether any invocation started with `prefix`
    pub fn saw(&self, prefix: &str) -> bool {
        self.invocations.lock().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        cmd: &str,
        args: &[&str],
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<CommandOutput> {
        let line = std::iter::once(cmd)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.invocations.lock().push(line.clone());

        let rules = self.rules.lock();
        for (prefix, output) in rules.iter() {
            if line.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(CommandOutput::ok(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_runner_captures_output() {
        let runner = SystemRunner;
        let out = runner
            .run("echo", &["hello"], Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn system_runner_reports_exit_code() {
        let runner = SystemRunner;
        let out = runner
            .run("sh", &["-c", "exit 3"], Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn scripted_runner_matches_prefix_and_records() {
        let runner = ScriptedRunner::new();
        runner.respond("git branch", CommandOutput::ok("main\n"));
        runner.respond("git push", CommandOutput::failed("network down"));

        let branch = runner
            .run("git", &["branch", "--show-current"], Path::new("."), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(branch.stdout.trim(), "main");

        let push = runner
            .run("git", &["push", "-u", "origin", "x"], Path::new("."), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!push.success());

        assert!(runner.saw("git branch"));
        assert_eq!(runner.invocations().len(), 2);
    }
}
