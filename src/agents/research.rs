//! Research stage: questions, web-backed findings, analysis.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{prompts, AgentContext, ParseError, Stage, StageError, StageName};
use crate::cache::{CacheError, CacheKey};
use crate::llm::ChatMessage;
use crate::web_search::{format_hits, WebSearch};

const NAMESPACE: &str = "research";
const SEARCH_NAMESPACE: &str = "search";

#[derive(Debug, thiserror::Error)]
enum SearchFailure {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Search(anyhow::Error),
}

/// What the user asked the pipeline to research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub company: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub follow_up: Option<String>,
}

impl ResearchRequest {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            audience: None,
            follow_up: None,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_follow_up(mut self, follow_up: impl Into<String>) -> Self {
        self.follow_up = Some(follow_up.into());
        self
    }

    /// The research task handed to the findings call and the web search.
    pub fn task(&self) -> String {
        let audience = self.audience.as_deref().filter(|a| !a.trim().is_empty());
        let follow_up = self.follow_up.as_deref().filter(|f| !f.trim().is_empty());

        match (follow_up, audience) {
            (Some(q), Some(aud)) => format!(
                "Given the target company {} and target audience {}, {}",
                self.company, aud, q
            ),
            (Some(q), None) => format!("Given the target company {}, {}", self.company, q),
            (None, Some(aud)) => format!(
                "Research market opportunities and strategies for {} targeting {}. \
                 Focus on market size, customer needs, and potential strategies.",
                self.company, aud
            ),
            (None, None) => self.company.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub company: String,
    pub audience: Option<String>,
    pub questions: Vec<String>,
    pub raw_findings: String,
    pub analysis: String,
}

impl ResearchReport {
    /// Combined plain-text report consumed by the marketing stage.
    pub fn to_text(&self) -> String {
        let questions = self
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Research Questions:\n{}\n\nRaw Findings:\n{}\n\nAnalysis:\n{}",
            questions, self.raw_findings, self.analysis
        )
    }
}

pub struct ResearchAgent {
    ctx: AgentContext,
    search: Option<Arc<dyn WebSearch>>,
    max_hits: usize,
}

impl ResearchAgent {
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            search: None,
            max_hits: 5,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>, max_hits: usize) -> Self {
        self.search = Some(search);
        self.max_hits = max_hits;
        self
    }

    /// Search results for `task`, formatted for the prompt.
    ///
    /// Formatted results are cached like completions, so a rerun sends the
    /// same findings prompt. Search failures are logged, never cached, and
    /// the findings call proceeds without them.
    async fn search_context(&self, task: &str) -> Result<Option<String>, StageError> {
        let Some(search) = self.search.as_ref() else {
            return Ok(None);
        };
        let key = CacheKey::from_parts(
            SEARCH_NAMESPACE,
            &[search.identity(), task.to_string(), self.max_hits.to_string()],
        );
        let max_hits = self.max_hits;
        let result: Result<String, SearchFailure> = self
            .ctx
            .cache()
            .get_or_compute(&key, || async move {
                let hits = search.search(task).await.map_err(SearchFailure::Search)?;
                Ok(format_hits(&hits, max_hits))
            })
            .await;

        match result {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(SearchFailure::Search(e)) => {
                tracing::warn!(error = %e, "web search failed, continuing without results");
                Ok(None)
            }
            Err(SearchFailure::Cache(e)) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Stage for ResearchAgent {
    type Input = ResearchRequest;
    type Output = ResearchReport;

    fn name(&self) -> StageName {
        StageName::Research
    }

    async fn run(&self, input: &ResearchRequest) -> Result<ResearchReport, StageError> {
        let questions = self
            .ctx
            .ask_with(
                NAMESPACE,
                vec![
                    ChatMessage::system(prompts::RESEARCH_SYSTEM),
                    ChatMessage::user(prompts::research_questions(&input.company)),
                ],
                parse_questions,
            )
            .await?;
        tracing::debug!(count = questions.len(), "research questions generated");

        let task = input.task();
        let context = self.search_context(&task).await?;
        let raw_findings = self
            .ctx
            .ask(
                NAMESPACE,
                "findings",
                vec![
                    ChatMessage::system(prompts::RESEARCH_SYSTEM),
                    ChatMessage::user(prompts::research_findings(&task, context.as_deref())),
                ],
            )
            .await?;

        let analysis = self
            .ctx
            .ask(
                NAMESPACE,
                "analysis",
                vec![
                    ChatMessage::system(prompts::RESEARCH_SYSTEM),
                    ChatMessage::user(prompts::research_analysis(&raw_findings)),
                ],
            )
            .await?;

        Ok(ResearchReport {
            company: input.company.clone(),
            audience: input.audience.clone(),
            questions,
            raw_findings,
            analysis,
        })
    }
}

/// Extract list items from a model response.
///
/// Numbered (`1.`, `2)`) and bulleted (`-`, `*`, `•`) lines are items, as is
/// any bare line ending in `?`. Lines ending in `:` are headings and skipped.
pub fn parse_questions(text: &str) -> Result<Vec<String>, ParseError> {
    let mut questions = Vec::new();
    for line in text.lines() {
        let line = line.trim().replace("**", "");
        let line = line.trim();
        if line.is_empty() || line.ends_with(':') {
            continue;
        }
        match strip_list_marker(line) {
            Some(item) if item.chars().any(char::is_alphanumeric) => {
                questions.push(item.to_string())
            }
            Some(_) => {}
            None if line.ends_with('?') => questions.push(line.to_string()),
            None => {}
        }
    }

    if questions.is_empty() {
        return Err(ParseError::NoQuestions);
    }
    Ok(questions)
}

/// The text after a leading `N.`, `N)`, `-`, `*` or `•` marker. Bullets
/// must be followed by whitespace.
pub(crate) fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ['-', '*', '•'] {
        if let Some(rest) = line.strip_prefix(bullet) {
            // `---` and `**` are rules or emphasis, not bullets
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Some(rest.trim());
            }
            return None;
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{context, ScriptedModel};
    use crate::web_search::SearchHit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scripted() -> ScriptedModel {
        ScriptedModel::new()
            .reply(
                "key research questions",
                "Questions:\n1. How big is the market?\n2) Who are the competitors?\n- What do customers need?",
            )
            .reply("Summarise", "Market is growing 12% a year.")
            .reply("Analyse these research findings", "Focus on premium segment.")
    }

    #[test]
    fn parses_numbered_and_bulleted_questions() {
        let qs = parse_questions(
            "Here are the questions:\n\n1. **Market size?**\n2) Competitors?\n* Pricing?\nWhat about regulation?\nA stray remark.",
        )
        .unwrap();
        assert_eq!(
            qs,
            vec![
                "Market size?",
                "Competitors?",
                "Pricing?",
                "What about regulation?"
            ]
        );
    }

    #[test]
    fn markdown_rules_are_not_questions() {
        let qs = parse_questions("Here you go:\n---\n1. Market?\n---\n- ...\n***").unwrap();
        assert_eq!(qs, vec!["Market?"]);
        assert_eq!(strip_list_marker("--"), None);
        assert_eq!(strip_list_marker("- Pricing"), Some("Pricing"));
    }

    #[test]
    fn no_questions_is_an_error() {
        assert_eq!(parse_questions("Nothing to see.\n\n"), Err(ParseError::NoQuestions));
        assert_eq!(parse_questions(""), Err(ParseError::NoQuestions));
    }

    #[test]
    fn task_wording_depends_on_inputs() {
        let base = ResearchRequest::new("Acme");
        assert_eq!(base.task(), "Acme");

        let with_audience = base.clone().with_audience("runners");
        assert!(with_audience
            .task()
            .starts_with("Research market opportunities and strategies for Acme targeting runners."));

        let follow = with_audience.with_follow_up("what are the pricing trends?");
        assert_eq!(
            follow.task(),
            "Given the target company Acme and target audience runners, what are the pricing trends?"
        );
    }

    #[test]
    fn report_text_has_all_sections() {
        let report = ResearchReport {
            company: "Acme".into(),
            audience: None,
            questions: vec!["A?".into(), "B?".into()],
            raw_findings: "findings".into(),
            analysis: "analysis".into(),
        };
        assert_eq!(
            report.to_text(),
            "Research Questions:\n1. A?\n2. B?\n\nRaw Findings:\nfindings\n\nAnalysis:\nanalysis"
        );
    }

    #[tokio::test]
    async fn deterministic_model_gives_identical_reports() {
        let request = ResearchRequest::new("Acme").with_audience("runners");

        let first = ResearchAgent::new(context(std::sync::Arc::new(scripted())))
            .run(&request)
            .await
            .unwrap();
        let second = ResearchAgent::new(context(std::sync::Arc::new(scripted())))
            .run(&request)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.questions.len(), 3);
        assert_eq!(first.raw_findings, "Market is growing 12% a year.");
        assert_eq!(first.analysis, "Focus on premium segment.");
    }

    #[tokio::test]
    async fn empty_analysis_fails_the_stage() {
        let model = ScriptedModel::new()
            .reply("key research questions", "1. Market?")
            .reply("Summarise", "Findings.")
            .reply("Analyse these research findings", "\n  \n");
        let agent = ResearchAgent::new(context(std::sync::Arc::new(model)));

        let err = agent.run(&ResearchRequest::new("Acme")).await.unwrap_err();
        assert!(matches!(err, StageError::Parse(ParseError::Empty("analysis"))));
    }

    /// Returns a fresh headline on every call, like a live search index.
    struct ChangingSearch(AtomicUsize);

    #[async_trait]
    impl WebSearch for ChangingSearch {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<SearchHit>> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![SearchHit {
                title: format!("Headline {}", n),
                url: format!("https://news.test/{}", n),
                content: None,
            }])
        }
    }

    #[tokio::test]
    async fn repeated_runs_reuse_cached_search_results() {
        let model = std::sync::Arc::new(scripted());
        let search = Arc::new(ChangingSearch(AtomicUsize::new(0)));
        let agent = ResearchAgent::new(context(model.clone())).with_search(search.clone(), 5);
        let request = ResearchRequest::new("Acme");

        let first = agent.run(&request).await.unwrap();
        let second = agent.run(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(search.0.load(Ordering::SeqCst), 1);
        assert_eq!(model.call_count(), 3);
    }

    struct FixedSearch(anyhow::Result<Vec<SearchHit>>);

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<SearchHit>> {
            match &self.0 {
                Ok(hits) => Ok(hits.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    #[tokio::test]
    async fn search_results_are_embedded_in_findings_prompt() {
        let model = std::sync::Arc::new(scripted());
        let search = FixedSearch(Ok(vec![SearchHit {
            title: "Acme grows".into(),
            url: "https://news.test/acme".into(),
            content: Some("Revenue up".into()),
        }]));
        let agent = ResearchAgent::new(context(model.clone())).with_search(Arc::new(search), 5);

        agent.run(&ResearchRequest::new("Acme")).await.unwrap();
        assert_eq!(model.calls_matching("URL: https://news.test/acme"), 1);
    }

    #[tokio::test]
    async fn search_failure_does_not_fail_the_stage() {
        let model = std::sync::Arc::new(scripted());
        let search = FixedSearch(Err(anyhow::anyhow!("quota exceeded")));
        let agent = ResearchAgent::new(context(model.clone())).with_search(Arc::new(search), 5);

        let report = agent.run(&ResearchRequest::new("Acme")).await.unwrap();
        assert_eq!(report.raw_findings, "Market is growing 12% a year.");
        assert_eq!(model.calls_matching("web search results"), 0);
        assert_eq!(agent.ctx.cache().durable().len().await.unwrap(), 3);
    }
}
