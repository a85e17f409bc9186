//! Iterative search: formulate, search, evaluate, repeat.
//!
//! Each iteration asks the [`QueryFormulator`] for candidate queries, runs
//! them concurrently against the [`SearchBackend`] and appends one
//! [`QueryRound`] to the log. The [`ConvergencePolicy`] decides when enough
//! evidence has been gathered; `max_iterations` bounds the loop regardless.

use super::{QueryFormulator, SearchBackend, SearchResult};
use crate::config::OrchestratorConfig;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Results of one query within a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResults {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// One iteration of the coordinator. Never modified once logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRound {
    pub queries: Vec<String>,
    /// Results in the same order as `queries`.
    pub results_by_query: Vec<QueryResults>,
}

impl QueryRound {
    pub fn result_count(&self) -> usize {
        self.results_by_query.iter().map(|q| q.results.len()).sum()
    }
}

/// Why the coordinator stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The convergence policy was satisfied.
    Converged,
    /// No new candidate queries were produced.
    NoQueries,
    /// The round cap was reached.
    MaxIterations,
}

/// The iteration log of one search session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchLog {
    pub rounds: Vec<QueryRound>,
    pub stop_reason: StopReason,
}

impl SearchLog {
    pub fn iterations(&self) -> usize {
        self.rounds.len()
    }

    pub fn total_results(&self) -> usize {
        self.rounds.iter().map(QueryRound::result_count).sum()
    }

    /// Every query issued, in order.
    pub fn queries(&self) -> Vec<String> {
        self.rounds
            .iter()
            .flat_map(|round| round.queries.iter().cloned())
            .collect()
    }

    /// Per-query results across all rounds, in order.
    pub fn results_by_query(&self) -> impl Iterator<Item = &QueryResults> {
        self.rounds.iter().flat_map(|round| round.results_by_query.iter())
    }
}

/// Decides when accumulated rounds hold enough evidence.
pub trait ConvergencePolicy: Send + Sync {
    fn is_converged(&self, rounds: &[QueryRound]) -> bool;
}

/// Converged once the raw result count reaches a threshold.
#[derive(Debug, Clone, Copy)]
pub struct ResultCountThreshold(pub usize);

impl ConvergencePolicy for ResultCountThreshold {
    fn is_converged(&self, rounds: &[QueryRound]) -> bool {
        rounds.iter().map(QueryRound::result_count).sum::<usize>() >= self.0
    }
}

enum State {
    Formulate,
    Search(Vec<String>),
    Evaluate,
    Done(StopReason),
}

/// Drives repeated formulation and search rounds until convergence.
pub struct IterativeSearchCoordinator {
    formulator: Arc<QueryFormulator>,
    backend: Arc<dyn SearchBackend>,
    policy: Box<dyn ConvergencePolicy>,
    max_iterations: usize,
    max_results: usize,
}

impl IterativeSearchCoordinator {
    pub fn new(
        formulator: Arc<QueryFormulator>,
        backend: Arc<dyn SearchBackend>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            formulator,
            backend,
            policy: Box::new(ResultCountThreshold(config.min_results_threshold)),
            max_iterations: config.max_iterations,
            max_results: config.max_search_results,
        }
    }

    /// Replace the default result-count policy.
    pub fn with_policy(mut self, policy: Box<dyn ConvergencePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Search for evidence on `prompt`.
    ///
    /// Always returns a log, possibly empty. The first round uses plain
    /// extraction; later rounds are told which queries were already tried.
    #[instrument(skip(self))]
    pub async fn run(&self, prompt: &str) -> SearchLog {
        let mut rounds: Vec<QueryRound> = Vec::new();
        let mut state = State::Formulate;

        loop {
            state = match state {
                State::Formulate if rounds.len() >= self.max_iterations => {
                    State::Done(StopReason::MaxIterations)
                }
                State::Formulate => {
                    let queries = if rounds.is_empty() {
                        self.formulator.extract(prompt).await
                    } else {
                        let tried: Vec<String> =
                            rounds.iter().flat_map(|r| r.queries.clone()).collect();
                        self.formulator.extract_followup(prompt, &tried).await
                    };

                    if queries.is_empty() {
                        State::Done(StopReason::NoQueries)
                    } else {
                        State::Search(queries)
                    }
                }
                State::Search(queries) => {
                    rounds.push(self.search_round(queries).await);
                    State::Evaluate
                }
                State::Evaluate => {
                    if self.policy.is_converged(&rounds) {
                        State::Done(StopReason::Converged)
                    } else {
                        State::Formulate
                    }
                }
                State::Done(stop_reason) => {
                    let log = SearchLog { rounds, stop_reason };
                    info!(
                        "Search finished after {} rounds with {} results ({:?})",
                        log.iterations(),
                        log.total_results(),
                        log.stop_reason
                    );
                    return log;
                }
            };
        }
    }

    /// Run sibling queries concurrently, keeping their order in the round.
    #[instrument(skip(self), fields(queries = queries.len()))]
    pub async fn search_round(&self, queries: Vec<String>) -> QueryRound {
        let results = join_all(
            queries
                .iter()
                .map(|query| self.backend.search(query, self.max_results)),
        )
        .await;

        let results_by_query = queries
            .iter()
            .cloned()
            .zip(results)
            .map(|(query, results)| QueryResults { query, results })
            .collect();

        let round = QueryRound {
            queries,
            results_by_query,
        };
        debug!("Round returned {} results", round.result_count());
        round
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::testing::{ScriptedModel, StaticSearch};

    fn config(max_iterations: usize, min_results_threshold: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            max_iterations,
            min_results_threshold,
            ..OrchestratorConfig::default()
        }
    }

    fn coordinator(
        model: ScriptedModel,
        search: Arc<StaticSearch>,
        config: &OrchestratorConfig,
    ) -> IterativeSearchCoordinator {
        let formulator = Arc::new(QueryFormulator::new(Arc::new(model), &Prompts::default()));
        IterativeSearchCoordinator::new(formulator, search, config)
    }

    #[tokio::test]
    async fn test_stops_at_threshold() {
        let model = ScriptedModel::new()
            .reply(r#"["nvda price", "nvda news"]"#)
            .reply(r#"["nvda earnings"]"#)
            .reply(r#"["never asked"]"#);
        let search = Arc::new(
            StaticSearch::new()
                .with_results("nvda price", 2)
                .with_results("nvda news", 1)
                .with_results("nvda earnings", 4),
        );

        let log = coordinator(model, search.clone(), &config(5, 5))
            .run("NVDA outlook")
            .await;

        assert_eq!(log.iterations(), 2);
        assert_eq!(log.stop_reason, StopReason::Converged);
        assert_eq!(log.total_results(), 7);
        assert_eq!(log.queries(), vec!["nvda price", "nvda news", "nvda earnings"]);
        assert_eq!(search.calls(), 3);
    }

    #[tokio::test]
    async fn test_round_keeps_query_order() {
        let model = ScriptedModel::new().reply(r#"["b", "a", "c"]"#);
        let search = Arc::new(
            StaticSearch::new()
                .with_results("a", 1)
                .with_results("b", 2)
                .with_results("c", 3),
        );

        let log = coordinator(model, search, &config(1, 100)).run("x").await;

        let round = &log.rounds[0];
        let order: Vec<(&str, usize)> = round
            .results_by_query
            .iter()
            .map(|q| (q.query.as_str(), q.results.len()))
            .collect();
        assert_eq!(order, vec![("b", 2), ("a", 1), ("c", 3)]);
        assert_eq!(log.stop_reason, StopReason::MaxIterations);
    }

    #[tokio::test]
    async fn test_unreachable_backend_runs_every_round() {
        let model = ScriptedModel::new()
            .reply(r#"["q1"]"#)
            .reply(r#"["q2"]"#)
            .reply(r#"["q3"]"#)
            .reply(r#"["q4"]"#)
            .reply(r#"["q5"]"#)
            .reply(r#"["q6"]"#);
        let search = Arc::new(StaticSearch::unreachable());

        let log = coordinator(model, search.clone(), &config(5, 5)).run("x").await;

        assert_eq!(log.iterations(), 5);
        assert_eq!(log.total_results(), 0);
        assert_eq!(log.stop_reason, StopReason::MaxIterations);
        assert_eq!(search.calls(), 5);
    }

    #[tokio::test]
    async fn test_no_queries_converges_without_round() {
        let model = ScriptedModel::new().reply(r#"["q1"]"#).reply(r#"["q1"]"#);
        let search = Arc::new(StaticSearch::new());

        let log = coordinator(model, search, &config(5, 5)).run("x").await;

        assert_eq!(log.iterations(), 1);
        assert_eq!(log.stop_reason, StopReason::NoQueries);
    }

    #[tokio::test]
    async fn test_failed_first_extraction_is_empty_log() {
        let model = ScriptedModel::new().reply("not json");
        let search = Arc::new(StaticSearch::new());

        let log = coordinator(model, search.clone(), &config(5, 5)).run("x").await;

        assert!(log.rounds.is_empty());
        assert_eq!(log.stop_reason, StopReason::NoQueries);
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        struct OneRound;
        impl ConvergencePolicy for OneRound {
            fn is_converged(&self, rounds: &[QueryRound]) -> bool {
                !rounds.is_empty()
            }
        }

        let model = ScriptedModel::new().reply(r#"["q1"]"#).reply(r#"["q2"]"#);
        let search = Arc::new(StaticSearch::new());

        let log = coordinator(model, search, &config(5, 5))
            .with_policy(Box::new(OneRound))
            .run("x")
            .await;

        assert_eq!(log.iterations(), 1);
        assert_eq!(log.stop_reason, StopReason::Converged);
    }
}
