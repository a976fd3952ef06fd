//! GitHub REST client for issues

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use devcrew_core::config::defaults;
use devcrew_core::error::{Error, Result};
use devcrew_core::forge::ForgeClient;
use devcrew_core::issue::{Issue, parse_issue_refs};

use crate::{DEFAULT_API_BASE, USER_AGENT, split_repo};

/// Issue client over the GitHub REST v3 API
pub struct GithubClient {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

/// Wire shape of a GitHub issue
#[derive(Debug, Deserialize)]
struct IssuePayload {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    /// Present only when the "issue" is actually a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl IssuePayload {
    fn into_issue(self) -> Issue {
        Issue::new(self.number, self.title, self.body.unwrap_or_default())
    }
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Forge(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!(%url, "GET");
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| Error::Forge(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Forge(format!("GitHub returned {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Forge(format!("malformed GitHub response: {e}")))
    }
}

#[async_trait]
impl ForgeClient for GithubClient {
    async fn fetch_issue(&self, repo: &str, number: u64) -> Result<Issue> {
        let (owner, name) = split_repo(repo)?;
        let payload: IssuePayload = self
            .get_json(format!(
                "{}/repos/{owner}/{name}/issues/{number}",
                self.api_base
            ))
            .await?;
        Ok(payload.into_issue())
    }

    async fn list_open_issues(&self, repo: &str) -> Result<Vec<Issue>> {
        let (owner, name) = split_repo(repo)?;
        let payloads: Vec<IssuePayload> = self
            .get_json(format!(
                "{}/repos/{owner}/{name}/issues?state=open&per_page=100",
                self.api_base
            ))
            .await?;
        Ok(payloads
            .into_iter()
            .filter(|p| p.pull_request.is_none())
            .map(IssuePayload::into_issue)
            .collect())
    }

    /// Sub-issues as `#N` references in the parent body; unfetchable
    /// references are skipped with a warning.
    async fn list_sub_issues(&self, repo: &str, issue: &Issue) -> Result<Vec<Issue>> {
        let mut sub_issues = Vec::new();
        for number in parse_issue_refs(&issue.body, issue.number) {
            match self.fetch_issue(repo, number).await {
                Ok(mut sub) => {
                    sub.parent = Some(issue.number);
                    sub_issues.push(sub);
                }
                Err(e) => warn!(number, error = %e, "sub-issue fetch failed, skipping"),
            }
        }
        Ok(sub_issues)
    }

    async fn post_comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        let (owner, name) = split_repo(repo)?;
        let url = format!(
            "{}/repos/{owner}/{name}/issues/{number}/comments",
            self.api_base
        );
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| Error::Forge(format!("comment request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Forge(format!(
                "comment rejected with {}",
                response.status()
            )));
        }
        Ok(())
    }
}
