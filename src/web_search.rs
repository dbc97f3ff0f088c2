//! Web search tool used by the research agent.
//!
//! [`TavilySearch`] calls the Tavily search API and returns ranked hits.
//! [`format_hits`] renders them into the plain-text context block that is
//! embedded in the research prompt.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SearchConfig;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Names the provider and every setting that changes its results.
    /// Part of the cache key for formatted results.
    fn identity(&self) -> String {
        "web".to_string()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    url: String,
    max_results: usize,
    search_depth: String,
}

impl TavilySearch {
    pub fn new(api_key: &str, config: &SearchConfig) -> Result<Self> {
        Self::with_url(api_key, config, TAVILY_URL)
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_url(api_key: &str, config: &SearchConfig, url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: url.to_string(),
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
        })
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    fn identity(&self) -> String {
        format!("tavily:{}:{}", self.max_results, self.search_depth)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "query": query,
            "max_results": self.max_results,
            "search_depth": self.search_depth,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Tavily API error {}: {}", status, body_text);
        }

        let parsed: TavilyResponse = response.json().await?;
        tracing::debug!(query, hits = parsed.results.len(), "web search complete");
        Ok(parsed.results)
    }
}

/// Render up to `limit` hits as `Title/Content/URL` blocks.
pub fn format_hits(hits: &[SearchHit], limit: usize) -> String {
    hits.iter()
        .take(limit)
        .map(|hit| {
            format!(
                "Title: {}\nContent: {}\nURL: {}",
                hit.title,
                hit.content.as_deref().unwrap_or("No content available"),
                hit.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
