//! Research → Marketing → Ad Generation.
//!
//! [`Pipeline::run`] awaits each stage in turn and hands its typed output to
//! the next. The first failing stage aborts the run: later stages are never
//! invoked and the error names the stage that failed.
//!
//! Around every stage the pipeline emits [`PipelineEvent`]s to its progress
//! reporter and, when a [`HistoryStore`] is attached, records the stage
//! output and the final run status. History is a display record: write
//! failures are logged and never abort a run.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::agents::{
    AdGenerator, AdPortfolio, AgentContext, MarketingAgent, MarketingStrategy, ResearchAgent,
    ResearchReport, ResearchRequest, Stage, StageError, StageName,
};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::images::ImageGenerator;
use crate::progress::{NoProgress, PipelineEvent, ProgressReporter};
use crate::web_search::WebSearch;

pub type ResearchStage = dyn Stage<Input = ResearchRequest, Output = ResearchReport>;
pub type MarketingStage = dyn Stage<Input = ResearchReport, Output = MarketingStrategy>;
pub type AdStage = dyn Stage<Input = MarketingStrategy, Output = AdPortfolio>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> StageName {
        match self {
            PipelineError::Stage { stage, .. } => *stage,
        }
    }
}

/// Outputs of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Option<String>,
    pub research: ResearchReport,
    pub marketing: MarketingStrategy,
    pub ads: AdPortfolio,
}

/// Output of a research-only run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    pub run_id: Option<String>,
    pub research: ResearchReport,
}

/// Optional external services for the standard agents.
#[derive(Clone, Default)]
pub struct Tools {
    pub search: Option<Arc<dyn WebSearch>>,
    pub images: Option<Arc<dyn ImageGenerator>>,
}

pub struct Pipeline {
    research: Box<ResearchStage>,
    marketing: Box<MarketingStage>,
    ads: Box<AdStage>,
    progress: Box<dyn ProgressReporter>,
    history: Option<HistoryStore>,
}

impl Pipeline {
    pub fn new(
        research: Box<ResearchStage>,
        marketing: Box<MarketingStage>,
        ads: Box<AdStage>,
    ) -> Self {
        Self {
            research,
            marketing,
            ads,
            progress: Box::new(NoProgress),
            history: None,
        }
    }

    /// The three standard agents sharing one model and cache.
    pub fn standard(ctx: AgentContext, config: &Config, tools: Tools) -> Self {
        let mut research = ResearchAgent::new(ctx.clone());
        if let Some(search) = tools.search {
            research = research.with_search(search, config.search.max_results);
        }
        let marketing = MarketingAgent::new(ctx.clone(), config.pipeline.campaigns());
        let mut ads = AdGenerator::new(ctx);
        if let Some(dir) = &config.pipeline.output_dir {
            ads = ads.with_output_dir(dir);
        }
        if let Some(images) = tools.images {
            ads = ads.with_images(images);
        }
        Self::new(Box::new(research), Box::new(marketing), Box::new(ads))
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    /// Run all three stages.
    pub async fn run(&self, request: &ResearchRequest) -> Result<PipelineOutcome, PipelineError> {
        tracing::info!(company = %request.company, "pipeline started");
        let run_id = self.start_run(request).await;
        let id = run_id.as_deref();

        let result = async {
            let research = self.run_stage(&*self.research, request, id).await?;
            let marketing = self.run_stage(&*self.marketing, &research, id).await?;
            let ads = self.run_stage(&*self.ads, &marketing, id).await?;
            Ok::<_, PipelineError>((research, marketing, ads))
        }
        .await;
        self.finish_run(id, result.as_ref().err()).await;

        let (research, marketing, ads) = result?;
        tracing::info!(company = %request.company, campaigns = ads.campaigns.len(), "pipeline finished");
        Ok(PipelineOutcome {
            run_id,
            research,
            marketing,
            ads,
        })
    }

    /// Run the research stage alone, e.g. for a follow-up question.
    pub async fn research_only(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchOutcome, PipelineError> {
        let run_id = self.start_run(request).await;
        let id = run_id.as_deref();

        let result = self.run_stage(&*self.research, request, id).await;
        self.finish_run(id, result.as_ref().err()).await;

        Ok(ResearchOutcome {
            run_id,
            research: result?,
        })
    }

    async fn run_stage<S>(
        &self,
        stage: &S,
        input: &S::Input,
        run_id: Option<&str>,
    ) -> Result<S::Output, PipelineError>
    where
        S: Stage + ?Sized,
        S::Output: Serialize,
    {
        let name = stage.name();
        self.progress
            .report(PipelineEvent::StageStarted { stage: name });
        let started = Instant::now();

        match stage.run(input).await {
            Ok(output) => {
                let elapsed = started.elapsed();
                tracing::debug!(stage = %name, elapsed_ms = elapsed.as_millis() as u64, "stage finished");
                self.progress
                    .report(PipelineEvent::StageFinished { stage: name, elapsed });
                if let (Some(history), Some(id)) = (&self.history, run_id) {
                    if let Err(e) = history.record_stage(id, name, &output).await {
                        tracing::warn!(stage = %name, error = %e, "failed to record stage output");
                    }
                }
                Ok(output)
            }
            Err(source) => {
                tracing::error!(stage = %name, error = %source, "stage failed, aborting pipeline");
                self.progress.report(PipelineEvent::StageFailed {
                    stage: name,
                    error: source.to_string(),
                });
                Err(PipelineError::Stage {
                    stage: name,
                    source,
                })
            }
        }
    }

    async fn start_run(&self, request: &ResearchRequest) -> Option<String> {
        let history = self.history.as_ref()?;
        match history.start_run(request).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "failed to record run start");
                None
            }
        }
    }

    async fn finish_run(&self, run_id: Option<&str>, failure: Option<&PipelineError>) {
        let (Some(history), Some(id)) = (&self.history, run_id) else {
            return;
        };
        let message = failure.map(|e| (e.stage(), e.to_string()));
        let failure = message.as_ref().map(|(stage, msg)| (*stage, msg.as_str()));
        if let Err(e) = history.finish_run(id, failure).await {
            tracing::warn!(run_id = id, error = %e, "failed to record run status");
        }
    }
}
