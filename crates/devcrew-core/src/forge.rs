//! Forge and project-board interfaces
//!
//! The pipeline consumes these traits only; concrete clients (GitHub REST +
//! Projects GraphQL) live in the `devcrew-forge` crate. Board failures are
//! warnings by contract, so `BoardClient` errors never fail a run.

use async_trait::async_trait;

use crate::error::Result;
use crate::issue::Issue;

/// Read/write access to the issue tracker
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Fetch a single issue by number
    async fn fetch_issue(&self, repo: &str, number: u64) -> Result<Issue>;

    /// List open issues, excluding pull requests
    async fn list_open_issues(&self, repo: &str) -> Result<Vec<Issue>>;

    /// Resolve an issue's sub-issues (native API when available, else `#N`
    /// references parsed from the body)
    async fn list_sub_issues(&self, repo: &str, issue: &Issue) -> Result<Vec<Issue>>;

    /// Post a comment on an issue
    async fn post_comment(&self, repo: &str, number: u64, body: &str) -> Result<()>;
}

/// Project-board column transitions
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Move an issue's board item to the named column
    async fn move_issue(&self, repo: &str, number: u64, column: &str) -> Result<()>;
}
