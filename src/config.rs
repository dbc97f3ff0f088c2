use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Upper bound on campaigns requested from the marketing stage.
pub const MAX_CAMPAIGNS: usize = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/adsmith.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_num_campaigns")]
    pub num_campaigns: usize,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_campaigns: default_num_campaigns(),
            output_dir: None,
        }
    }
}

fn default_num_campaigns() -> usize {
    5
}

impl PipelineConfig {
    /// Requested campaign count, clamped to `1..=MAX_CAMPAIGNS`.
    pub fn campaigns(&self) -> usize {
        self.num_campaigns.clamp(1, MAX_CAMPAIGNS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
            search_depth: default_search_depth(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    5
}
fn default_search_depth() -> String {
    "advanced".to_string()
}

/// Campaign image rendering. Active only when `STABILITY_API_KEY` is set
/// and campaign assets are written to an output directory.
#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_images_host")]
    pub api_host: String,
    #[serde(default = "default_engine_id")]
    pub engine_id: String,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_image_side")]
    pub width: u32,
    #[serde(default = "default_image_side")]
    pub height: u32,
    #[serde(default = "default_images_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_host: default_images_host(),
            engine_id: default_engine_id(),
            cfg_scale: default_cfg_scale(),
            steps: default_steps(),
            width: default_image_side(),
            height: default_image_side(),
            timeout_secs: default_images_timeout_secs(),
        }
    }
}

fn default_images_host() -> String {
    "https://api.stability.ai".to_string()
}
fn default_engine_id() -> String {
    "stable-diffusion-xl-1024-v1-0".to_string()
}
fn default_cfg_scale() -> f32 {
    7.5
}
fn default_steps() -> u32 {
    10
}
fn default_image_side() -> u32 {
    1024
}
fn default_images_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_durable")]
    pub durable: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            durable: default_durable(),
        }
    }
}

fn default_durable() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.max_tokens == Some(0) {
            anyhow::bail!("llm.max_tokens must be > 0 when set");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be > 0");
        }
        if self.search.max_results == 0 {
            anyhow::bail!("search.max_results must be >= 1");
        }
        match self.search.search_depth.as_str() {
            "basic" | "advanced" => {}
            other => anyhow::bail!(
                "Unknown search.search_depth: '{}'. Must be basic or advanced.",
                other
            ),
        }
        if self.images.steps == 0 {
            anyhow::bail!("images.steps must be >= 1");
        }
        for (name, side) in [("width", self.images.width), ("height", self.images.height)] {
            if side == 0 || side % 64 != 0 {
                anyhow::bail!("images.{} must be a positive multiple of 64", name);
            }
        }
        match self.cache.durable.as_str() {
            "sqlite" | "memory" => {}
            other => anyhow::bail!(
                "Unknown cache.durable backend: '{}'. Must be sqlite or memory.",
                other
            ),
        }
        Ok(())
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`.
///
/// A missing file yields [`Config::minimal`]; an unreadable or invalid file
/// is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}
