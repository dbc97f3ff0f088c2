//! Credentials loaded from the process environment.
//!
//! [`Settings`] is built once at startup and passed by reference to every
//! component that needs it. Loading either returns a fully populated value
//! or a [`SettingsError`] naming every variable that was missing, so a
//! misconfigured deployment fails before any agent runs.
//!
//! A `.env` file in the working directory is read first (via `dotenv`);
//! variables already present in the environment take precedence.

use std::fmt;

/// Azure OpenAI API key.
pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
/// Azure OpenAI resource endpoint, e.g. `https://my-resource.openai.azure.com`.
pub const AZURE_OPENAI_API_BASE: &str = "AZURE_OPENAI_API_BASE";
/// Azure OpenAI REST API version, e.g. `2024-02-01`.
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
/// Name of the chat deployment to call.
pub const AZURE_OPENAI_DEPLOYMENT_NAME: &str = "AZURE_OPENAI_DEPLOYMENT_NAME";
/// Tavily web search API key.
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

/// Stability AI key. Optional: campaign images are rendered only when set.
pub const STABILITY_API_KEY: &str = "STABILITY_API_KEY";

/// Every variable [`Settings::load`] requires, in reporting order.
pub const REQUIRED_VARS: [&str; 5] = [
    AZURE_OPENAI_API_KEY,
    AZURE_OPENAI_API_BASE,
    AZURE_OPENAI_API_VERSION,
    AZURE_OPENAI_DEPLOYMENT_NAME,
    TAVILY_API_KEY,
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Connection details for the hosted chat-completion deployment.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureSettings {
    pub api_key: String,
    pub api_base: String,
    pub api_version: String,
    pub deployment_name: String,
}

/// Immutable credential set for one process.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub azure: AzureSettings,
    pub search_api_key: String,
    pub image_api_key: Option<String>,
}

impl Settings {
    /// Load settings from `.env` and the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        // A missing .env file is the common case in production.
        let _ = dotenv::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// Values that are absent, empty, or whitespace-only count as missing.
    /// All missing names are collected before failing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = Vec::with_capacity(REQUIRED_VARS.len());
        let mut missing = Vec::new();

        for name in REQUIRED_VARS {
            match lookup(name).map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => values.push(v),
                _ => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }

        let image_api_key = lookup(STABILITY_API_KEY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();

        Ok(Self {
            azure: AzureSettings {
                api_key: next(),
                api_base: next().trim_end_matches('/').to_string(),
                api_version: next(),
                deployment_name: next(),
            },
            search_api_key: next(),
            image_api_key,
        })
    }
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}…", visible)
}

impl fmt::Debug for AzureSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSettings")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("deployment_name", &self.deployment_name)
            .finish()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("azure", &self.azure)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("image_api_key", &self.image_api_key.as_deref().map(redact))
            .finish()
    }
}
