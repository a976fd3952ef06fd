//! Devcrew Forge - GitHub client
//!
//! Implements the core crate's `ForgeClient` and `BoardClient` traits over
//! the GitHub REST v3 API and the Projects v2 GraphQL API. The pipeline only
//! ever sees the traits; everything GitHub-specific stays in this crate.

mod board;
mod github;

pub use board::ProjectsBoard;
pub use github::GithubClient;

/// Default REST endpoint
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User agent sent with every request
pub(crate) const USER_AGENT: &str = concat!("devcrew/", env!("CARGO_PKG_VERSION"));

/// Split `owner/repo` into its parts
pub(crate) fn split_repo(repo: &str) -> Result<(&str, &str), devcrew_core::Error> {
    repo.split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty())
        .ok_or_else(|| devcrew_core::Error::Forge(format!("repository must be owner/repo: {repo}")))
}
