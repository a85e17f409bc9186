//! Grounded answer synthesis with numbered citations.

mod evidence;

pub use evidence::{sources_section, Evidence, Source};

use crate::config::Prompts;
use crate::llm::{complete_text, ChatModel, CompletionOptions, Message};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Returned without calling the model when there is no evidence.
pub const NO_RESULTS_MESSAGE: &str =
    "I couldn't find any relevant search results to answer your query.";

/// Returned when the model call fails.
pub const SYNTHESIS_FAILED_MESSAGE: &str =
    "I was unable to synthesize the search results into a coherent answer due to an LLM error.";

const SYNTHESIS_MAX_TOKENS: u32 = 4000;

/// A synthesized answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text, followed by the sources list when the model answered.
    pub text: String,
    /// Sources in citation order.
    pub sources: Vec<Source>,
    /// False when a fixed fallback message was returned instead.
    pub synthesized: bool,
}

/// Asks the model for one answer bound to the supplied evidence.
pub struct AnswerSynthesizer {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
    citation_regex: Regex,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn ChatModel>, prompts: &Prompts) -> Self {
        Self {
            model,
            system_prompt: prompts.synthesize.clone(),
            citation_regex: Regex::new(r"\[Source\s+(\d+)\]").expect("Invalid regex"),
        }
    }

    /// Answer `prompt` from `evidence`.
    ///
    /// Never fails: empty evidence and model errors produce fixed messages.
    #[instrument(skip(self, evidence), fields(sources = evidence.source_count()))]
    pub async fn synthesize(&self, prompt: &str, evidence: &Evidence) -> Answer {
        if evidence.is_empty() {
            info!("No evidence to synthesize from");
            return Answer {
                text: NO_RESULTS_MESSAGE.to_string(),
                sources: Vec::new(),
                synthesized: false,
            };
        }

        let sources = evidence.sources();
        let messages = [
            Message::system(self.system_prompt.as_str()),
            Message::user(evidence.to_context(prompt)),
        ];
        let options = CompletionOptions::default().with_max_tokens(SYNTHESIS_MAX_TOKENS);

        let body = match complete_text(self.model.as_ref(), &messages, &options).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                warn!("Model returned an empty answer");
                return self.failed();
            }
            Err(e) => {
                warn!("Synthesis failed: {}", e);
                return self.failed();
            }
        };

        let dangling: Vec<usize> = self
            .cited_indices(&body)
            .into_iter()
            .filter(|n| *n == 0 || *n > sources.len())
            .collect();
        if !dangling.is_empty() {
            warn!(
                "Answer cites sources {:?} but only {} exist",
                dangling,
                sources.len()
            );
        }

        Answer {
            text: format!("{}{}", body, sources_section(&sources)),
            sources,
            synthesized: true,
        }
    }

    /// Distinct `[Source N]` numbers cited in `text`, ascending.
    pub fn cited_indices(&self, text: &str) -> Vec<usize> {
        self.citation_regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
            .collect::<BTreeSet<usize>>()
            .into_iter()
            .collect()
    }

    fn failed(&self) -> Answer {
        Answer {
            text: SYNTHESIS_FAILED_MESSAGE.to_string(),
            sources: Vec::new(),
            synthesized: false,
        }
    }
}
