//! Ad generation stage: tagline, story and image prompt per campaign.
//!
//! When an output directory is configured, each campaign's assets are written
//! to `{output_dir}/{sanitized_name}_{YYYYmmdd_HHMMSS}/`:
//!
//! | file                    | content                                 |
//! |-------------------------|-----------------------------------------|
//! | `tagline.txt`           | normalised tagline                      |
//! | `story.txt`             | brand narrative                         |
//! | `image_prompt.txt`      | text-to-image prompt                    |
//! | `image.png`             | rendered image prompt, when images are on |
//! | `campaign_details.json` | the campaign concept plus all of the above |
//!
//! Every campaign is generated (and rendered) before anything is written, so
//! a failed stage leaves no asset folders behind.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::campaign::{prompt_suggestions, CampaignIdea};
use super::marketing::MarketingStrategy;
use super::{non_empty, prompts, AgentContext, ParseError, Stage, StageError, StageName};
use crate::cache::CacheKey;
use crate::images::ImageGenerator;
use crate::llm::ChatMessage;

const NAMESPACE: &str = "adgen";
const IMAGE_NAMESPACE: &str = "image";
const IMAGE_FILE: &str = "image.png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCampaign {
    pub campaign: CampaignIdea,
    pub tagline: String,
    pub story: String,
    pub image_prompt: String,
    #[serde(default)]
    pub asset_dir: Option<PathBuf>,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdPortfolio {
    pub company: String,
    pub campaigns: Vec<AdCampaign>,
}

pub struct AdGenerator {
    ctx: AgentContext,
    output_dir: Option<PathBuf>,
    images: Option<Arc<dyn ImageGenerator>>,
}

impl AdGenerator {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            output_dir: None,
            images: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Render each image prompt when assets are written.
    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// PNG for `ad`, cached by generator identity and prompt.
    async fn render_image(&self, ad: &AdCampaign) -> Result<Option<Vec<u8>>, StageError> {
        let Some(images) = self.images.as_ref() else {
            return Ok(None);
        };
        let key = CacheKey::from_parts(
            IMAGE_NAMESPACE,
            &[images.identity(), ad.image_prompt.clone()],
        );
        let prompt = ad.image_prompt.as_str();
        let encoded: String = self
            .ctx
            .cache()
            .get_or_compute(&key, || async move {
                let png = images.generate(prompt).await.map_err(StageError::Image)?;
                Ok::<_, StageError>(STANDARD.encode(png))
            })
            .await?;
        let png = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| StageError::Image(e.into()))?;
        Ok(Some(png))
    }

    fn messages(prompt: String) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(prompts::CREATIVE_SYSTEM),
            ChatMessage::user(prompt),
        ]
    }

    async fn generate(&self, idea: &CampaignIdea) -> Result<AdCampaign, StageError> {
        let core = idea.core_message();
        let theme = idea.visual_theme();
        let appeal = idea.emotional_appeal();

        let tagline = self
            .ctx
            .ask_with(
                NAMESPACE,
                Self::messages(prompts::tagline(&core, &theme, &appeal)),
                normalize_tagline,
            )
            .await?;
        let story = self
            .ctx
            .ask(
                NAMESPACE,
                "story",
                Self::messages(prompts::story(&core, &theme, &appeal)),
            )
            .await?;

        let seeds = idea
            .prompt_suggestions
            .clone()
            .unwrap_or_else(|| prompt_suggestions(idea));
        let image_prompt = self
            .ctx
            .ask(
                NAMESPACE,
                "image prompt",
                Self::messages(prompts::image_prompt(
                    &idea.campaign_name,
                    &seeds.product_focused,
                    &seeds.brand_focused,
                    &seeds.social_media,
                )),
            )
            .await?;

        Ok(AdCampaign {
            campaign: idea.clone(),
            tagline,
            story,
            image_prompt,
            asset_dir: None,
            image_path: None,
        })
    }
}

#[async_trait]
impl Stage for AdGenerator {
    type Input = MarketingStrategy;
    type Output = AdPortfolio;

    fn name(&self) -> StageName {
        StageName::AdGeneration
    }

    async fn run(&self, strategy: &MarketingStrategy) -> Result<AdPortfolio, StageError> {
        let mut campaigns = Vec::with_capacity(strategy.campaigns.len());
        for idea in &strategy.campaigns {
            campaigns.push(self.generate(idea).await?);
        }

        if let Some(root) = &self.output_dir {
            let mut images = Vec::with_capacity(campaigns.len());
            for ad in &campaigns {
                images.push(self.render_image(ad).await?);
            }
            write_portfolio(root, &mut campaigns, &images).await?;
        }

        Ok(AdPortfolio {
            company: strategy.company.clone(),
            campaigns,
        })
    }
}

/// First non-empty line, without surrounding quotes or a `Tagline:` label.
pub fn normalize_tagline(text: &str) -> Result<String, ParseError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let line = line
        .strip_prefix("Tagline:")
        .or_else(|| line.strip_prefix("tagline:"))
        .unwrap_or(line)
        .trim();
    let unquoted = line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'));
    non_empty(unquoted, "tagline")
}

/// Replace every non-alphanumeric character with `_` and trim `_` at the ends.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "campaign".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Write every campaign's assets, recording where they went. On failure the
/// folders written so far are removed.
async fn write_portfolio(
    root: &Path,
    campaigns: &mut [AdCampaign],
    images: &[Option<Vec<u8>>],
) -> Result<(), StageError> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(campaigns.len());
    for (ad, image) in campaigns.iter_mut().zip(images) {
        match write_assets(root, ad, image.as_deref()).await {
            Ok(dir) => {
                tracing::info!(
                    campaign = %ad.campaign.campaign_name,
                    dir = %dir.display(),
                    "assets written"
                );
                ad.image_path = image.as_ref().map(|_| dir.join(IMAGE_FILE));
                ad.asset_dir = Some(dir.clone());
                written.push(dir);
            }
            Err(e) => {
                for dir in &written {
                    if let Err(rm) = tokio::fs::remove_dir_all(dir).await {
                        tracing::warn!(
                            dir = %dir.display(),
                            error = %rm,
                            "failed to remove partial assets"
                        );
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Write `ad` (and its image, if rendered) under a fresh directory in
/// `root` and return that directory.
pub async fn write_assets(
    root: &Path,
    ad: &AdCampaign,
    image: Option<&[u8]>,
) -> Result<PathBuf, StageError> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let base = format!("{}_{}", sanitize_name(&ad.campaign.campaign_name), stamp);

    let mut dir = root.join(&base);
    let mut n = 1;
    while tokio::fs::try_exists(&dir).await? {
        n += 1;
        dir = root.join(format!("{}_{}", base, n));
    }
    tokio::fs::create_dir_all(&dir).await?;

    if let Err(e) = write_files(&dir, ad, image).await {
        let _ = tokio::fs::remove_dir_all(&dir).await;
        return Err(e);
    }
    Ok(dir)
}

async fn write_files(dir: &Path, ad: &AdCampaign, image: Option<&[u8]>) -> Result<(), StageError> {
    tokio::fs::write(dir.join("tagline.txt"), &ad.tagline).await?;
    tokio::fs::write(dir.join("story.txt"), &ad.story).await?;
    tokio::fs::write(dir.join("image_prompt.txt"), &ad.image_prompt).await?;

    let image_path = match image {
        Some(png) => {
            let path = dir.join(IMAGE_FILE);
            tokio::fs::write(&path, png).await?;
            Some(path)
        }
        None => None,
    };

    let details = serde_json::json!({
        "campaign": ad.campaign,
        "generated_assets": {
            "tagline": ad.tagline,
            "story": ad.story,
            "image_prompt": ad.image_prompt,
            "image_path": image_path,
        }
    });
    let json = serde_json::to_string_pretty(&details).map_err(std::io::Error::other)?;
    tokio::fs::write(dir.join("campaign_details.json"), json).await?;
    Ok(())
}
