//! GitHub Projects v2 board transitions
//!
//! Column moves go through the GraphQL API: find the issue's project item,
//! find the single-select "Status" field option matching the column name,
//! then update the item's field value. Board failures are warnings at the
//! pipeline level, so every error here is descriptive rather than fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use devcrew_core::config::defaults;
use devcrew_core::error::{Error, Result};
use devcrew_core::forge::BoardClient;

use crate::{USER_AGENT, split_repo};

const GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Status field name used by GitHub project boards
const STATUS_FIELD: &str = "Status";

/// Projects v2 client
pub struct ProjectsBoard {
    http: reqwest::Client,
    token: String,
    graphql_url: String,
}

impl ProjectsBoard {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_graphql_url(token, GRAPHQL_URL)
    }

    pub fn with_graphql_url(token: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::HTTP_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Forge(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            token: token.into(),
            graphql_url: url.into(),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| Error::Forge(format!("GraphQL request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Forge(format!("GraphQL returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Forge(format!("malformed GraphQL response: {e}")))?;
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(Error::Forge(format!("GraphQL errors: {errors:?}")));
            }
        }
        Ok(body)
    }

    /// The issue's first project item, with the Status field's options
    async fn locate_item(&self, repo: &str, number: u64) -> Result<BoardItem> {
        let (owner, name) = split_repo(repo)?;
        let query = r#"
            query($owner: String!, $name: String!, $number: Int!) {
              repository(owner: $owner, name: $name) {
                issue(number: $number) {
                  projectItems(first: 5) {
                    nodes {
                      id
                      project {
                        id
                        field(name: "Status") {
                          ... on ProjectV2SingleSelectField {
                            id
                            options { id name }
                          }
                        }
                      }
                    }
                  }
                }
              }
            }"#;
        let body = self
            .graphql(
                query,
                json!({ "owner": owner, "name": name, "number": number }),
            )
            .await?;

        let nodes = body
            .pointer("/data/repository/issue/projectItems/nodes")
            .and_then(|n| n.as_array())
            .ok_or_else(|| Error::Forge(format!("issue #{number} has no project items")))?;
        let node = nodes
            .first()
            .ok_or_else(|| Error::Forge(format!("issue #{number} is not on any project board")))?;

        parse_board_item(node)
            .ok_or_else(|| Error::Forge(format!("project for issue #{number} has no {STATUS_FIELD} field")))
    }
}

#[derive(Debug, PartialEq)]
struct BoardItem {
    item_id: String,
    project_id: String,
    field_id: String,
    options: Vec<(String, String)>,
}

fn parse_board_item(node: &Value) -> Option<BoardItem> {
    let item_id = node.get("id")?.as_str()?.to_string();
    let project = node.get("project")?;
    let project_id = project.get("id")?.as_str()?.to_string();
    let field = project.get("field")?;
    let field_id = field.get("id")?.as_str()?.to_string();
    let options = field
        .get("options")?
        .as_array()?
        .iter()
        .filter_map(|option| {
            Some((
                option.get("id")?.as_str()?.to_string(),
                option.get("name")?.as_str()?.to_string(),
            ))
        })
        .collect();
    Some(BoardItem {
        item_id,
        project_id,
        field_id,
        options,
    })
}

#[async_trait]
impl BoardClient for ProjectsBoard {
    async fn move_issue(&self, repo: &str, number: u64, column: &str) -> Result<()> {
        let item = self.locate_item(repo, number).await?;
        let option_id = item
            .options
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(column))
            .map(|(id, _)| id.clone())
            .ok_or_else(|| Error::Forge(format!("board has no column named '{column}'")))?;

        debug!(number, column, "moving board item");
        let mutation = r#"
            mutation($project: ID!, $item: ID!, $field: ID!, $option: String!) {
              updateProjectV2ItemFieldValue(input: {
                projectId: $project,
                itemId: $item,
                fieldId: $field,
                value: { singleSelectOptionId: $option }
              }) {
                projectV2Item { id }
              }
            }"#;
        self.graphql(
            mutation,
            json!({
                "project": item.project_id,
                "item": item.item_id,
                "field": item.field_id,
                "option": option_id,
            }),
        )
        .await?;
        Ok(())
    }
}
