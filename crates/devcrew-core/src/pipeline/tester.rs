//! Tester stage
//!
//! Detects the target repository's test command and runs it through the
//! subprocess runner against the post-apply working tree. A repository with
//! no detectable test command skips the stage.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::defaults;
use crate::error::Result;
use crate::proc::CommandRunner;

/// A detected test invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TestCommand {
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(|a| a.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of the Tester stage
#[derive(Debug, Clone)]
pub enum TestOutcome {
    /// No test command was detected
    Skipped,
    Passed { command: String },
    Failed { command: String, detail: String },
}

/// Detect the repository's test command: a `package.json` `scripts.test`
/// entry wins, then a `Makefile` with a `test:` target.
pub fn detect_test_command(root: &Path) -> Option<TestCommand> {
    let package_json = root.join("package.json");
    if let Ok(raw) = std::fs::read_to_string(&package_json) {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) {
            let script = parsed.get("scripts").and_then(|s| s.get("test")).and_then(|t| t.as_str());
            if script.is_some_and(|s| !s.trim().is_empty() && !s.contains("no test specified")) {
                return Some(TestCommand {
                    program: "npm".to_string(),
                    args: vec!["test".to_string(), "--silent".to_string()],
                });
            }
        }
    }

    let makefile = root.join("Makefile");
    if let Ok(raw) = std::fs::read_to_string(&makefile) {
        if raw.lines().any(|line| line.starts_with("test:")) {
            return Some(TestCommand {
                program: "make".to_string(),
                args: vec!["test".to_string()],
            });
        }
    }

    None
}

/// Run the detected test command, if any
pub async fn run_tests(root: &Path, runner: &dyn CommandRunner) -> Result<TestOutcome> {
    let Some(command) = detect_test_command(root) else {
        info!("no test command detected, skipping tester stage");
        return Ok(TestOutcome::Skipped);
    };

    let args: Vec<&str> = command.args.iter().map(|a| a.as_str()).collect();
    let output = runner
        .run(
            &command.program,
            &args,
            root,
            Duration::from_secs(defaults::TEST_TIMEOUT_SECS),
        )
        .await?;

    if output.success() {
        Ok(TestOutcome::Passed {
            command: command.display(),
        })
    } else {
        let mut detail = output.stderr.trim().to_string();
        if detail.is_empty() {
            detail = output.stdout.trim().to_string();
        }
        if detail.len() > 2000 {
            let mut end = 2000;
            while !detail.is_char_boundary(end) {
                end -= 1;
            }
            detail.truncate(end);
        }
        Ok(TestOutcome::Failed {
            command: command.display(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{CommandOutput, ScriptedRunner};

    #[test]
    fn detects_npm_test_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"test": "node test/run.js"}}"#,
        )
        .unwrap();
        let command = detect_test_command(dir.path()).unwrap();
        assert_eq!(command.program, "npm");
    }

    #[test]
    fn ignores_npm_placeholder_test_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"test": "echo \"Error: no test specified\" && exit 1"}}"#,
        )
        .unwrap();
        assert!(detect_test_command(dir.path()).is_none());
    }

    #[test]
    fn detects_makefile_test_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "build:\n\ttrue\ntest:\n\ttrue\n").unwrap();
        let command = detect_test_command(dir.path()).unwrap();
        assert_eq!(command.program, "make");
    }

    #[test]
    fn no_command_detected_in_bare_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_test_command(dir.path()).is_none());
    }

    #[tokio::test]
    async fn failing_tests_report_detail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"test": "node test/run.js"}}"#,
        )
        .unwrap();
        let runner = ScriptedRunner::new();
        runner.respond("npm test", CommandOutput::failed("2 assertions failed"));

        match run_tests(dir.path(), &runner).await.unwrap() {
            TestOutcome::Failed { detail, .. } => assert!(detail.contains("assertions")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_tree_skips() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        assert!(matches!(
            run_tests(dir.path(), &runner).await.unwrap(),
            TestOutcome::Skipped
        ));
        assert!(runner.invocations().is_empty());
    }
}
