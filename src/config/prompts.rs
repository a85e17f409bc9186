//! Prompt templates for Scout.
//!
//! Any prompt can be overridden from a TOML file (`prompts.custom_file`);
//! keys missing from the file keep their built-in text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Collection of all system prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    /// Compresses a prompt into one short search query.
    pub optimize: String,
    /// Asks for a JSON array of search queries.
    pub extract: String,
    /// Asks for new queries given the ones already tried. Uses `{{tried}}`.
    pub extract_followup: String,
    /// Binds the final answer to the numbered evidence.
    pub synthesize: String,
    /// Asks the model to pick one tool. Uses `{{tools}}`.
    pub tool_decision: String,
    /// Turns a tool's output into the final answer.
    pub tool_summary: String,
    /// Plain streaming chat.
    pub chat: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            optimize: r#"Convert the user's prompt into an optimal web search query (2-8 words).

Guidelines:
- Use specific keywords search engines understand
- Remove conversational words ("what", "how", "can you tell me")
- Focus on core information need
- Include time modifiers if relevant ("today", "current", "2024")

Examples:
"What's Google's stock price right now?" -> GOOGL stock price current
"How much does a Tesla cost?" -> Tesla price 2024
"What time is it in Boston?" -> current time Boston

Return ONLY the optimized search query."#
                .to_string(),

            extract: r#"You are an expert at formulating effective web search queries.
Based on the user's prompt, generate a JSON array of 2-8 concise search queries.
Each query should be relevant and optimized for a web search engine.
Return ONLY the JSON array, nothing else. Example: ["query 1", "query 2"]"#
                .to_string(),

            extract_followup: r#"You are an expert at formulating effective web search queries.
The searches below did not return enough results to answer the user's prompt:
{{tried}}

Generate a JSON array of 1-8 NEW concise search queries that approach the prompt
from a different angle. Do not repeat any query listed above.
Return ONLY the JSON array, nothing else. If no useful query remains, return []."#
                .to_string(),

            synthesize: r#"You are a research assistant. Use the provided evidence to answer the user's original prompt comprehensively and accurately.

Requirements:
- Base your answer ONLY on the evidence provided.
- Cite sources using [Source 1], [Source 2], etc., corresponding to the numbered sources in the context.
- If information conflicts between sources, mention the discrepancies.
- Provide direct, factual answers.
- If the evidence doesn't fully answer the question, clearly state what information is missing.
- Be thorough but concise.
- If multiple queries were used, cover insights from all of them and finish with a consolidated summary."#
                .to_string(),

            tool_decision: r#"You are a tool dispatcher. Choose the single best tool for the user's request and the arguments to call it with.

Available tools (JSON definitions):
{{tools}}

Respond with ONLY a JSON object of the form:
{"tool": "<tool name>", "args": {"<parameter>": <value>}}
Supply every required parameter. Do not add any other text."#
                .to_string(),

            tool_summary: r#"You are a helpful assistant. A tool was run on the user's behalf and its output is in the tool message.
Answer the user's request using that output. Quote figures exactly as given and say so if the output does not contain what was asked."#
                .to_string(),

            chat: "You are a helpful AI assistant.".to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, applying overrides from a custom TOML file if given.
    pub fn load(custom_file: Option<&str>) -> crate::error::Result<Self> {
        match custom_file {
            Some(file) => {
                let path = crate::config::Settings::expand_path(file);
                if path.exists() {
                    let content = std::fs::read_to_string(&path)?;
                    Ok(toml::from_str(&content)?)
                } else {
                    tracing::warn!("Custom prompt file {:?} not found, using defaults", path);
                    Ok(Prompts::default())
                }
            }
            None => Ok(Prompts::default()),
        }
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.synthesize.contains("[Source 1]"));
        assert!(prompts.tool_decision.contains("{{tools}}"));
        assert!(prompts.extract_followup.contains("{{tried}}"));
    }

    #[test]
    fn test_render_template() {
        let mut vars = HashMap::new();
        vars.insert("tools".to_string(), "[]".to_string());

        let result = Prompts::render("Tools: {{tools}}", &vars);
        assert_eq!(result, "Tools: []");
    }

    #[test]
    fn test_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.toml");
        std::fs::write(&path, "chat = \"Be terse.\"\n").unwrap();

        let prompts = Prompts::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(prompts.chat, "Be terse.");
        assert_eq!(prompts.extract, Prompts::default().extract);
    }
}
