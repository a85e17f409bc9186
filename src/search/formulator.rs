//! Turning prompts into search queries with the model.

use crate::config::Prompts;
use crate::llm::{complete_text, ChatModel, CompletionOptions, Message};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const OPTIMIZE_MAX_TOKENS: u32 = 100;
const EXTRACT_MAX_TOKENS: u32 = 200;

/// Default cap on queries taken from one extraction.
pub const DEFAULT_MAX_QUERIES: usize = 8;

/// Rewrites prompts into search queries.
///
/// Model failures never propagate: `optimize` falls back to the prompt and
/// the extraction calls fall back to no queries.
pub struct QueryFormulator {
    model: Arc<dyn ChatModel>,
    optimize_prompt: String,
    extract_prompt: String,
    followup_prompt: String,
    max_queries: usize,
}

impl QueryFormulator {
    pub fn new(model: Arc<dyn ChatModel>, prompts: &Prompts) -> Self {
        Self {
            model,
            optimize_prompt: prompts.optimize.clone(),
            extract_prompt: prompts.extract.clone(),
            followup_prompt: prompts.extract_followup.clone(),
            max_queries: DEFAULT_MAX_QUERIES,
        }
    }

    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries.max(1);
        self
    }

    /// Compress a prompt into one short search query.
    #[instrument(skip(self))]
    pub async fn optimize(&self, prompt: &str) -> String {
        let messages = [
            Message::system(self.optimize_prompt.as_str()),
            Message::user(format!("Original prompt: {}", prompt)),
        ];
        let options = CompletionOptions::default().with_max_tokens(OPTIMIZE_MAX_TOKENS);

        match complete_text(self.model.as_ref(), &messages, &options).await {
            Ok(text) => match clean_query(&text) {
                Some(query) => {
                    info!("Optimized query: {}", query);
                    query
                }
                None => {
                    warn!("Model returned an empty query, using the original prompt");
                    prompt.to_string()
                }
            },
            Err(e) => {
                warn!("Query optimization failed, using the original prompt: {}", e);
                prompt.to_string()
            }
        }
    }

    /// Ask the model for a list of queries covering the prompt.
    #[instrument(skip(self))]
    pub async fn extract(&self, prompt: &str) -> Vec<String> {
        let messages = [
            Message::system(self.extract_prompt.as_str()),
            Message::user(format!("User prompt: {}", prompt)),
        ];
        self.request_queries(&messages).await
    }

    /// Ask for queries that differ from the ones already `tried`.
    ///
    /// Any query the model repeats is discarded.
    #[instrument(skip(self, tried), fields(tried = tried.len()))]
    pub async fn extract_followup(&self, prompt: &str, tried: &[String]) -> Vec<String> {
        let mut vars = HashMap::new();
        vars.insert(
            "tried".to_string(),
            tried
                .iter()
                .map(|q| format!("- {}", q))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let messages = [
            Message::system(Prompts::render(&self.followup_prompt, &vars)),
            Message::user(format!("User prompt: {}", prompt)),
        ];

        let queries: Vec<String> = self
            .request_queries(&messages)
            .await
            .into_iter()
            .filter(|q| !tried.iter().any(|t| t.eq_ignore_ascii_case(q)))
            .collect();
        debug!("{} new follow-up queries", queries.len());
        queries
    }

    async fn request_queries(&self, messages: &[Message]) -> Vec<String> {
        let options = CompletionOptions::default().with_max_tokens(EXTRACT_MAX_TOKENS);
        match complete_text(self.model.as_ref(), messages, &options).await {
            Ok(text) => {
                let queries = parse_query_array(&text, self.max_queries);
                if queries.is_empty() {
                    warn!("Could not parse a query list from: {}", text);
                }
                queries
            }
            Err(e) => {
                warn!("Query extraction failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Pull a JSON array of query strings out of free model text.
///
/// Takes the span from the first `[` to the last `]`. Non-string and blank
/// elements are dropped, duplicates removed, and at most `max` kept. Anything
/// unparseable yields an empty list.
pub fn parse_query_array(text: &str, max: usize) -> Vec<String> {
    let span = match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Vec::new(),
    };

    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(span) else {
        return Vec::new();
    };

    let mut queries: Vec<String> = Vec::new();
    for query in items.iter().filter_map(Value::as_str).map(str::trim) {
        if !query.is_empty() && !queries.iter().any(|q| q == query) {
            queries.push(query.to_string());
        }
    }
    queries.truncate(max);
    queries
}

/// First non-empty line of a model reply, stripped of quotes.
fn clean_query(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let query = line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim();
    (!query.is_empty()).then(|| query.to_string())
}
