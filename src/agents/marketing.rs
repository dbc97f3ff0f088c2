//! Marketing stage: brand, audience and market analyses, then campaign ideas.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::campaign::{campaigns_from_response, CampaignIdea};
use super::research::ResearchReport;
use super::{prompts, AgentContext, Stage, StageError, StageName};
use crate::llm::ChatMessage;

const NAMESPACE: &str = "marketing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingStrategy {
    pub company: String,
    pub brand_analysis: String,
    pub audience_profiles: String,
    pub market_position: String,
    pub campaigns: Vec<CampaignIdea>,
}

pub struct MarketingAgent {
    ctx: AgentContext,
    num_campaigns: usize,
}

impl MarketingAgent {
    /// `num_campaigns` is expected to be clamped already
    /// (see [`PipelineConfig::campaigns`](crate::config::PipelineConfig::campaigns)).
    pub fn new(ctx: AgentContext, num_campaigns: usize) -> Self {
        Self { ctx, num_campaigns }
    }

    async fn analyse(&self, field: &'static str, prompt: String) -> Result<String, StageError> {
        self.ctx
            .ask(
                NAMESPACE,
                field,
                vec![
                    ChatMessage::system(prompts::MARKETING_SYSTEM),
                    ChatMessage::user(prompt),
                ],
            )
            .await
    }
}

#[async_trait]
impl Stage for MarketingAgent {
    type Input = ResearchReport;
    type Output = MarketingStrategy;

    fn name(&self) -> StageName {
        StageName::Marketing
    }

    async fn run(&self, report: &ResearchReport) -> Result<MarketingStrategy, StageError> {
        let research = report.to_text();

        let brand_analysis = self
            .analyse("brand analysis", prompts::brand_analysis(&research))
            .await?;
        let audience_profiles = self
            .analyse("audience profiles", prompts::audience_mapping(&research))
            .await?;
        let market_position = self
            .analyse("market position", prompts::market_position(&research))
            .await?;

        let limit = self.num_campaigns;
        let campaigns = self
            .ctx
            .ask_with(
                NAMESPACE,
                vec![
                    ChatMessage::system(prompts::CREATIVE_SYSTEM),
                    ChatMessage::user(prompts::campaign_ideas(
                        &market_position,
                        &audience_profiles,
                        &brand_analysis,
                        limit,
                    )),
                ],
                move |text| campaigns_from_response(text, limit),
            )
            .await?;
        tracing::info!(company = %report.company, campaigns = campaigns.len(), "campaign ideas generated");

        Ok(MarketingStrategy {
            company: report.company.clone(),
            brand_analysis,
            audience_profiles,
            market_position,
            campaigns,
        })
    }
}
