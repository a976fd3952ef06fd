//! Language-model provider layer
//!
//! The pipeline talks to models through the `ModelClient` trait: one blocking
//! `invoke(system, user) -> text` call per agent stage. The default
//! implementation uses the genai framework, which covers both the local
//! Ollama provider and remote OpenAI-compatible endpoints. Timeouts and
//! retries are imposed here, provider-independently.

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest};
use genai::resolver::{AuthData, AuthResolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{Config, defaults};
use crate::error::{Error, Result};

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server (the default)
    Ollama,
    /// OpenAI or an OpenAI-compatible endpoint
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Synchronous text-in/text-out model contract used by every agent stage
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identity, for logging and the plan file
    fn model(&self) -> &str;

    /// One blocking completion; the implementation owns timeout and retry
    async fn invoke(&self, system: &str, user: &str) -> Result<String>;
}

/// GenAI-backed model client
pub struct GenAiModel {
    client: Client,
    model: String,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl GenAiModel {
    /// Build a client for the configured provider.
    ///
    /// The API key (for remote providers) comes from the provider's usual
    /// environment variable, resolved by genai itself; Ollama needs none.
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::default(),
            model: config.model_name().to_string(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
            retries: defaults::LLM_RETRIES,
            backoff: Duration::from_secs(defaults::LLM_BACKOFF_SECS),
        }
    }

    /// Build a client with an explicit API key
    pub fn with_api_key(config: &Config, api_key: &str) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );
        let client = Client::builder().with_auth_resolver(auth_resolver).build();
        Self {
            client,
            model: config.model_name().to_string(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
            retries: defaults::LLM_RETRIES,
            backoff: Duration::from_secs(defaults::LLM_BACKOFF_SECS),
        }
    }

    async fn invoke_once(&self, system: &str, user: &str) -> Result<String> {
        let chat_req = ChatRequest::default()
            .with_system(system)
            .append_message(ChatMessage::user(user));

        let result = tokio::time::timeout(
            self.timeout,
            self.client.exec_chat(&self.model, chat_req, None),
        )
        .await;

        match result {
            Ok(Ok(response)) => Ok(response.first_text().unwrap_or("").to_string()),
            Ok(Err(e)) => Err(Error::Provider(format!("model call failed: {e}"))),
            Err(_) => Err(Error::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl ModelClient for GenAiModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, system: &str, user: &str) -> Result<String> {
        let mut delay = self.backoff;
        let mut last_error = None;

        for attempt in 0..=self.retries {
            match self.invoke_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(model = %self.model, attempt, error = %e, "model call failed");
                    last_error = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Provider("model call failed".to_string())))
    }
}

/// Scripted model for tests: returns queued responses in order
#[derive(Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<String>>,
    invocations: Mutex<Vec<(String, String)>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().push_back(response.into());
    }

    /// (system, user) pairs seen so far
    pub fn invocations(&self) -> Vec<(String, String)> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn model(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, system: &str, user: &str) -> Result<String> {
        self.invocations
            .lock()
            .push((system.to_string(), user.to_string()));
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Provider("mock model has no scripted response".to_string()))
    }
}
