//! Chat-completion client abstraction.
//!
//! Defines the [`ChatModel`] trait that every agent calls through, and the
//! [`AzureChatClient`] implementation for an Azure OpenAI deployment.
//!
//! # Request shape
//!
//! ```text
//! POST {api_base}/openai/deployments/{deployment}/chat/completions?api-version={version}
//! api-key: <key>
//! { "messages": [...], "temperature": 0.7, "max_tokens": 800 }
//! ```
//!
//! # Retry Strategy
//!
//! Retries are off by default (`llm.max_retries = 0`). When enabled:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::RateLimited(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::MalformedResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A hosted or mocked chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stable description of the model and its sampling parameters.
    ///
    /// Two models with the same identity must produce interchangeable
    /// output for the same messages; it is folded into cache keys.
    fn identity(&self) -> String;

    /// Send one conversation and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat client for a single Azure OpenAI deployment.
pub struct AzureChatClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    api_version: String,
    deployment: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

impl AzureChatClient {
    pub fn new(settings: &Settings, config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: settings.azure.api_key.clone(),
            api_base: settings.azure.api_base.clone(),
            api_version: settings.azure.api_version.clone(),
            deployment: settings.azure.deployment_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.api_base, self.deployment, self.api_version
        )
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(body_text));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        parse_chat_response(parsed)
    }
}

fn parse_chat_response(response: ChatResponse) -> Result<String, LlmError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))?;

    if content.trim().is_empty() {
        return Err(LlmError::MalformedResponse(
            "empty message content".to_string(),
        ));
    }
    Ok(content)
}

#[async_trait]
impl ChatModel for AzureChatClient {
    fn identity(&self) -> String {
        format!(
            "azure:{}:t={}:max={}",
            self.deployment,
            self.temperature,
            self.max_tokens
                .map(|m| m.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            tracing::debug!(deployment = %self.deployment, attempt, "sending chat completion");
            match self.send_once(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    tracing::warn!(error = %e, attempt, "chat completion failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "chat completion failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Build the chat model the agents use.
pub fn create_llm(settings: &Settings, config: &LlmConfig) -> Result<Box<dyn ChatModel>, LlmError> {
    Ok(Box::new(AzureChatClient::new(settings, config)?))
}
