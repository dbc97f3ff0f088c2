//! Text-to-image generation for campaign assets.
//!
//! [`StabilityImages`] calls the Stability AI text-to-image endpoint and
//! returns the decoded PNG of the first artifact. The ad generator only
//! renders images when campaign assets are written to disk.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::time::Duration;

use crate::config::ImagesConfig;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider, engine and every setting that changes the picture.
    fn identity(&self) -> String;

    /// Render `prompt` and return PNG bytes.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    base64: String,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

pub struct StabilityImages {
    client: reqwest::Client,
    api_key: String,
    url: String,
    engine_id: String,
    cfg_scale: f32,
    steps: u32,
    width: u32,
    height: u32,
}

impl StabilityImages {
    pub fn new(api_key: &str, config: &ImagesConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: format!(
                "{}/v1/generation/{}/text-to-image",
                config.api_host.trim_end_matches('/'),
                config.engine_id
            ),
            engine_id: config.engine_id.clone(),
            cfg_scale: config.cfg_scale,
            steps: config.steps,
            width: config.width,
            height: config.height,
        })
    }
}

#[async_trait]
impl ImageGenerator for StabilityImages {
    fn identity(&self) -> String {
        format!(
            "stability:{}:{}:{}:{}x{}",
            self.engine_id, self.cfg_scale, self.steps, self.width, self.height
        )
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "text_prompts": [{ "text": prompt }],
            "cfg_scale": self.cfg_scale,
            "steps": self.steps,
            "width": self.width,
            "height": self.height,
            "samples": 1,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Stability API error {}: {}", status, body_text);
        }

        let parsed: GenerationResponse = response.json().await?;
        let Some(artifact) = parsed.artifacts.into_iter().next() else {
            bail!("Stability API returned no images");
        };
        if let Some(reason) = artifact.finish_reason.as_deref() {
            if reason != "SUCCESS" {
                bail!("image generation did not succeed: {}", reason);
            }
        }

        let png = STANDARD
            .decode(artifact.base64.as_bytes())
            .context("image payload is not valid base64")?;
        tracing::debug!(bytes = png.len(), "image generated");
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> ImagesConfig {
        ImagesConfig {
            api_host: host.to_string(),
            ..ImagesConfig::default()
        }
    }

    #[tokio::test]
    async fn decodes_first_artifact() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image",
            )
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "text_prompts": [{ "text": "a misty forest" }],
                "steps": 10,
                "samples": 1
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "artifacts": [{
                        "base64": STANDARD.encode(b"\x89PNG"),
                        "finishReason": "SUCCESS"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let images = StabilityImages::new("sk-test", &config(&server.url())).unwrap();
        let png = images.generate("a misty forest").await.unwrap();

        assert_eq!(png, b"\x89PNG");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_and_filtered_images_fail() {
        let mut server = mockito::Server::new_async().await;
        let _denied = server
            .mock("POST", mockito::Matcher::Any)
            .match_body(mockito::Matcher::Regex("denied".into()))
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;
        let _filtered = server
            .mock("POST", mockito::Matcher::Any)
            .match_body(mockito::Matcher::Regex("filtered".into()))
            .with_status(200)
            .with_body(r#"{"artifacts":[{"base64":"","finishReason":"CONTENT_FILTERED"}]}"#)
            .create_async()
            .await;

        let images = StabilityImages::new("sk-test", &config(&server.url())).unwrap();

        let err = images.generate("denied").await.unwrap_err();
        assert!(err.to_string().contains("401"));
        let err = images.generate("filtered").await.unwrap_err();
        assert!(err.to_string().contains("CONTENT_FILTERED"));
    }

    #[test]
    fn identity_covers_render_settings() {
        let a = StabilityImages::new("k", &ImagesConfig::default()).unwrap();
        let b = StabilityImages::new(
            "k",
            &ImagesConfig {
                steps: 30,
                ..ImagesConfig::default()
            },
        )
        .unwrap();
        assert_ne!(a.identity(), b.identity());
        assert!(a.identity().starts_with("stability:stable-diffusion-xl-1024-v1-0:"));
    }
}
