//! Pipeline stages.
//!
//! Three agents run in sequence, each consuming the previous agent's typed
//! output:
//!
//! ```text
//! ResearchRequest
//!     ↓
//! [ResearchAgent]   questions → web search + findings → analysis
//!     ↓ ResearchReport
//! [MarketingAgent]  brand voice, audience, market position → campaign ideas
//!     ↓ MarketingStrategy
//! [AdGenerator]     tagline, story, image prompt per campaign
//!     ↓ AdPortfolio
//! ```
//!
//! Every LLM call goes through [`AgentContext::ask_with`], which fingerprints
//! the conversation and consults the two-tier cache before calling the model.
//! Only responses that pass their parse function are cached.

pub mod adgen;
pub mod campaign;
pub mod marketing;
pub mod prompts;
pub mod research;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::cache::{CacheError, CacheKey, TwoTierCache};
use crate::llm::{ChatMessage, ChatModel, LlmError};

pub use adgen::{AdCampaign, AdGenerator, AdPortfolio};
pub use campaign::{CampaignIdea, PromptSuggestions, Section};
pub use marketing::{MarketingAgent, MarketingStrategy};
pub use research::{ResearchAgent, ResearchReport, ResearchRequest};

/// A model response that does not have the shape a stage expects.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty {0} in model response")]
    Empty(&'static str),

    #[error("no research questions found in model response")]
    NoQuestions,

    #[error("no campaigns found in model response")]
    NoCampaigns,

    #[error("campaign '{campaign}' is missing: {}", .fields.join(", "))]
    MissingFields {
        campaign: String,
        fields: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to write assets: {0}")]
    Io(#[from] std::io::Error),

    #[error("image generation failed: {0}")]
    Image(anyhow::Error),
}

/// Identifies a pipeline stage in errors, progress events and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Research,
    Marketing,
    AdGeneration,
}

impl StageName {
    pub const ALL: [StageName; 3] = [
        StageName::Research,
        StageName::Marketing,
        StageName::AdGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Research => "research",
            StageName::Marketing => "marketing",
            StageName::AdGeneration => "ad_generation",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn position(&self) -> usize {
        match self {
            StageName::Research => 0,
            StageName::Marketing => 1,
            StageName::AdGeneration => 2,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: Send + Sync;
    type Output: Send;

    fn name(&self) -> StageName;

    async fn run(&self, input: &Self::Input) -> Result<Self::Output, StageError>;
}

/// Model and cache shared by every agent.
#[derive(Clone)]
pub struct AgentContext {
    llm: Arc<dyn ChatModel>,
    cache: Arc<TwoTierCache>,
}

impl AgentContext {
    pub fn new(llm: Arc<dyn ChatModel>, cache: Arc<TwoTierCache>) -> Self {
        Self { llm, cache }
    }

    pub fn cache(&self) -> &Arc<TwoTierCache> {
        &self.cache
    }

    /// Cached completion returning the raw (non-empty) text.
    pub async fn ask(
        &self,
        namespace: &str,
        field: &'static str,
        messages: Vec<ChatMessage>,
    ) -> Result<String, StageError> {
        self.ask_with(namespace, messages, |text| non_empty(text, field))
            .await
    }

    /// Cached completion whose text is converted by `parse`.
    ///
    /// The cache key covers the model identity and every message. A parse
    /// failure is returned as a stage error and nothing is cached.
    pub async fn ask_with<T, P>(
        &self,
        namespace: &str,
        messages: Vec<ChatMessage>,
        parse: P,
    ) -> Result<T, StageError>
    where
        T: Serialize + DeserializeOwned + Send,
        P: FnOnce(&str) -> Result<T, ParseError> + Send,
    {
        let key = conversation_key(namespace, &self.llm.identity(), &messages);
        let llm = &self.llm;
        self.cache
            .get_or_compute(&key, || async move {
                let text = llm.complete(&messages).await?;
                Ok::<T, StageError>(parse(&text)?)
            })
            .await
    }
}

fn conversation_key(namespace: &str, identity: &str, messages: &[ChatMessage]) -> CacheKey {
    let mut parts = Vec::with_capacity(1 + messages.len() * 2);
    parts.push(identity.to_string());
    for m in messages {
        parts.push(format!("{:?}", m.role));
        parts.push(m.content.clone());
    }
    CacheKey::from_parts(namespace, &parts)
}

/// Trim `text`, failing with [`ParseError::Empty`] when nothing is left.
pub fn non_empty(text: &str, field: &'static str) -> Result<String, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ParseError::Empty(field))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic chat model for stage and pipeline tests.

    use super::*;
    use std::sync::Mutex;

    /// Replies are chosen by the first rule whose needle appears in the
    /// last user message; unmatched requests echo a fixed line.
    pub struct ScriptedModel {
        rules: Vec<(String, Result<String, String>)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self {
                rules: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(mut self, needle: &str, text: &str) -> Self {
            self.rules.push((needle.to_string(), Ok(text.to_string())));
            self
        }

        pub fn fail(mut self, needle: &str, body: &str) -> Self {
            self.rules.push((needle.to_string(), Err(body.to_string())));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn identity(&self) -> String {
            "scripted".to_string()
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            let user = messages
                .iter()
                .rev()
                .find(|m| m.role == crate::llm::Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(user.clone());

            for (needle, outcome) in &self.rules {
                if user.contains(needle.as_str()) {
                    return match outcome {
                        Ok(text) => Ok(text.clone()),
                        Err(body) => Err(LlmError::Api {
                            status: 500,
                            body: body.clone(),
                        }),
                    };
                }
            }
            Ok("Generic model output.".to_string())
        }
    }

    pub fn context(model: Arc<ScriptedModel>) -> AgentContext {
        AgentContext::new(model, Arc::new(TwoTierCache::in_memory()))
    }
}
