//! Session orchestrator for Scout.
//!
//! Wires the model, search backend, tools and synthesizer together and runs
//! one prompt through the selected strategy.

use crate::config::{OrchestratorConfig, Prompts, Settings};
use crate::error::{Result, ScoutError};
use crate::llm::{ChatModel, CompletionOptions, HttpModelClient, Message, TokenStream};
use crate::search::{
    IterativeSearchCoordinator, QueryFormulator, SearchBackend, SearxngClient,
};
use crate::synthesis::{AnswerSynthesizer, Evidence, Source};
use crate::tools::{Dispatcher, ToolAnswer, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default separator for queued queries.
pub const DEFAULT_SEPARATOR: &str = ";";

/// How a prompt is turned into searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// Optimize the prompt into one query and search once.
    Single,
    /// Search each query of the input as given.
    Queue { separator: String },
    /// Let the model extract queries and search iteratively.
    Extract,
}

/// Outcome of one research session.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub success: bool,
    pub answer: String,
    pub queries: Vec<String>,
    pub sources: Vec<Source>,
    pub source_count: usize,
    pub iterations: usize,
    /// Search failure detail, reported in single mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// The main orchestrator for Scout sessions.
pub struct Orchestrator {
    settings: Settings,
    prompts: Prompts,
    config: OrchestratorConfig,
    model: Arc<dyn ChatModel>,
    search: Arc<dyn SearchBackend>,
    registry: Arc<ToolRegistry>,
    formulator: Arc<QueryFormulator>,
    synthesizer: AnswerSynthesizer,
}

impl Orchestrator {
    /// Create an orchestrator talking to the configured backends.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(settings.prompts.custom_file.as_deref())?;
        let config = settings.orchestrator_config();

        let model: Arc<dyn ChatModel> = Arc::new(
            HttpModelClient::new(&config)?
                .with_api_key(settings.llm.api_key.clone())
                .with_default_temperature(settings.llm.temperature),
        );
        let search: Arc<dyn SearchBackend> = Arc::new(SearxngClient::new(
            &config.search_endpoint,
            Duration::from_secs(settings.search.timeout_secs),
        )?);
        let registry = Arc::new(ToolRegistry::scan(
            &settings.tools_dir(),
            settings.describe_timeout(),
        )?);

        Ok(Self::with_components(
            settings, prompts, model, search, registry,
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        model: Arc<dyn ChatModel>,
        search: Arc<dyn SearchBackend>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        let config = settings.orchestrator_config();
        let formulator = Arc::new(
            QueryFormulator::new(model.clone(), &prompts)
                .with_max_queries(settings.coordinator.max_queries),
        );
        let synthesizer = AnswerSynthesizer::new(model.clone(), &prompts);

        Self {
            settings,
            prompts,
            config,
            model,
            search,
            registry,
            formulator,
            synthesizer,
        }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    /// A coordinator bound to this orchestrator's components.
    pub fn coordinator(&self) -> IterativeSearchCoordinator {
        IterativeSearchCoordinator::new(self.formulator.clone(), self.search.clone(), &self.config)
    }

    /// A dispatcher over the registered tools.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.registry.clone(),
            self.model.clone(),
            &self.prompts,
            self.settings.execution_timeout(),
        )
        .with_native_function_calling(self.settings.llm.native_function_calling)
    }

    /// Search for evidence on `input` and synthesize an answer.
    pub async fn research(&self, input: &str, mode: &SearchMode) -> Result<ResearchReport> {
        self.run_research(input, mode, false).await
    }

    /// Like [`research`](Self::research), but also let the model run one tool
    /// and cite its output after the search results.
    pub async fn research_with_tool(
        &self,
        input: &str,
        mode: &SearchMode,
    ) -> Result<ResearchReport> {
        self.run_research(input, mode, true).await
    }

    #[instrument(skip(self, input), fields(mode = ?mode))]
    async fn run_research(
        &self,
        input: &str,
        mode: &SearchMode,
        with_tool: bool,
    ) -> Result<ResearchReport> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ScoutError::InvalidInput("Empty input".to_string()));
        }

        let mut evidence = Evidence::new();
        let mut diagnostic = None;

        let iterations = match mode {
            SearchMode::Single => {
                let query = self.formulator.optimize(input).await;
                let results = match self
                    .search
                    .try_search(&query, self.config.max_search_results)
                    .await
                {
                    Ok(results) => results,
                    Err(e) => {
                        warn!("Search failed for query '{}': {}", query, e);
                        diagnostic = Some(e.to_string());
                        Vec::new()
                    }
                };
                evidence.push_query(&query, results);
                1
            }
            SearchMode::Queue { separator } => {
                let queries = split_queries(input, separator);
                if queries.is_empty() {
                    return Err(ScoutError::NoQueries(
                        "No queries found after splitting input.".to_string(),
                    ));
                }
                info!("Queued queries: {:?}", queries);

                let round = self.coordinator().search_round(queries).await;
                for entry in round.results_by_query {
                    evidence.push_query(&entry.query, entry.results);
                }
                1
            }
            SearchMode::Extract => {
                let log = self.coordinator().run(input).await;
                if log.rounds.is_empty() {
                    return Err(ScoutError::NoQueries(
                        "Failed to extract search queries from prompt.".to_string(),
                    ));
                }
                evidence = Evidence::from_log(&log);
                log.iterations()
            }
        };

        if with_tool {
            self.add_tool_evidence(input, &mut evidence).await;
        }

        let answer = self.synthesizer.synthesize(input, &evidence).await;
        let sources = evidence.sources();

        Ok(ResearchReport {
            success: true,
            answer: answer.text,
            queries: evidence.queries().into_iter().map(str::to_string).collect(),
            source_count: sources.len(),
            sources,
            iterations,
            diagnostic,
        })
    }

    /// Append the output of a model-chosen tool. Failures only cost that source.
    async fn add_tool_evidence(&self, prompt: &str, evidence: &mut Evidence) {
        match self.dispatcher().run_auto(prompt).await {
            Ok(outcome) if !outcome.stdout().trim().is_empty() => {
                info!("Citing output of {}", outcome.tool_id);
                evidence.push_tool_output(&outcome.tool_id, outcome.stdout());
            }
            Ok(outcome) => warn!("{} printed nothing to cite", outcome.tool_id),
            Err(e) => warn!("No tool output added: {}", e),
        }
    }

    /// Let the model pick a tool for `prompt`, run it and answer from its output.
    pub async fn tool_answer(&self, prompt: &str) -> Result<ToolAnswer> {
        if prompt.trim().is_empty() {
            return Err(ScoutError::InvalidInput("Empty input".to_string()));
        }
        self.dispatcher().answer(prompt.trim()).await
    }

    /// Stream a plain chat reply to `prompt`.
    pub async fn chat_stream(&self, prompt: &str) -> Result<TokenStream> {
        let messages = [
            Message::system(self.prompts.chat.as_str()),
            Message::user(prompt),
        ];
        self.model
            .stream(&messages, &CompletionOptions::default())
            .await
    }
}

/// Split queued input into queries.
///
/// Input with newlines is split per line; otherwise on `separator`.
pub fn split_queries(input: &str, separator: &str) -> Vec<String> {
    let parts: Vec<&str> = if input.contains('\n') {
        input.split('\n').collect()
    } else if separator.is_empty() {
        vec![input]
    } else {
        input.split(separator).collect()
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}
