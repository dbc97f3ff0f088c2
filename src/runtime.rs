//! Wiring: turns a [`Config`] and [`Settings`] into a ready pipeline.
//!
//! Used by the CLI commands and the dashboard server so both run the same
//! stack: one SQLite pool shared by the durable cache and the run history,
//! one chat model, and the optional web search and image tools.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::agents::AgentContext;
use crate::cache::{CacheBackend, InMemoryBackend, SqliteBackend, TwoTierCache};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::images::{ImageGenerator, StabilityImages};
use crate::llm::{create_llm, ChatModel};
use crate::pipeline::{Pipeline, Tools};
use crate::progress::ProgressReporter;
use crate::settings::Settings;
use crate::web_search::{TavilySearch, WebSearch};
use crate::{db, migrate};

pub struct Runtime {
    pub cache: Arc<TwoTierCache>,
    pub history: HistoryStore,
    pub pipeline: Arc<Pipeline>,
}

/// Open the database and bring the schema up to date.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open database: {}", config.db.path.display()))?;
    migrate::apply(&pool).await?;
    Ok(pool)
}

/// The durable tier selected by `cache.durable`.
pub fn durable_backend(config: &Config, pool: &SqlitePool) -> Arc<dyn CacheBackend> {
    match config.cache.durable.as_str() {
        "memory" => Arc::new(InMemoryBackend::new()),
        _ => Arc::new(SqliteBackend::new(pool.clone())),
    }
}

/// Build the full pipeline. Requires credentials.
pub async fn build(
    config: &Config,
    settings: &Settings,
    progress: Box<dyn ProgressReporter>,
) -> Result<Runtime> {
    let pool = open_database(config).await?;
    let cache = Arc::new(TwoTierCache::new(durable_backend(config, &pool)));
    let history = HistoryStore::new(pool);

    let llm: Arc<dyn ChatModel> = Arc::from(
        create_llm(settings, &config.llm).context("Failed to create LLM client")?,
    );
    tracing::info!(model = %llm.identity(), "LLM client ready");

    let search: Option<Arc<dyn WebSearch>> = if config.search.enabled {
        Some(Arc::new(TavilySearch::new(
            &settings.search_api_key,
            &config.search,
        )?))
    } else {
        None
    };

    let images: Option<Arc<dyn ImageGenerator>> =
        match (&settings.image_api_key, config.images.enabled) {
            (Some(key), true) => Some(Arc::new(StabilityImages::new(key, &config.images)?)),
            _ => None,
        };
    if images.is_some() && config.pipeline.output_dir.is_none() {
        tracing::info!("images are rendered only when an output directory is set");
    }

    let ctx = AgentContext::new(llm, cache.clone());
    let pipeline = Pipeline::standard(ctx, config, Tools { search, images })
        .with_progress(progress)
        .with_history(history.clone());

    Ok(Runtime {
        cache,
        history,
        pipeline: Arc::new(pipeline),
    })
}
