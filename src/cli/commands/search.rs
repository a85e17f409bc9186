//! Search command implementation.

use super::{error_message, fail, orchestrator, read_input};
use crate::cli::{ModeArg, Output, SearchArgs};
use crate::config::Settings;
use crate::tools::{ToolDefinition, ToolOption};
use anyhow::Result;
use clap::ValueEnum;
use serde_json::json;
use tracing::error;

/// Run the search command.
pub async fn run_search(args: &SearchArgs, mut settings: Settings) -> Result<()> {
    if args.get_options {
        return Output::json(&search_options());
    }
    if args.get_definition {
        return Output::json(&search_definition());
    }

    let input = match &args.prompt {
        Some(prompt) => prompt.trim().to_string(),
        None => read_input(&args.input).await?,
    };
    if input.is_empty() {
        return Err(fail("Empty input"));
    }

    args.backend.apply(&mut settings);
    let orchestrator = orchestrator(settings)?;
    let mode = args.mode.into_mode(&args.separator);

    let spinner = Output::spinner("Searching...");
    let result = if args.with_tool {
        orchestrator.research_with_tool(&input, &mode).await
    } else {
        orchestrator.research(&input, &mode).await
    };
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            if let Some(diagnostic) = &report.diagnostic {
                Output::warning(&format!("Search failed: {}", diagnostic));
            }
            if args.json {
                Output::json(&report)?;
            } else {
                println!("{}", report.answer);
            }
            Ok(())
        }
        Err(e) => {
            error!("Search session failed: {}", e);
            Err(fail(&error_message(&e)))
        }
    }
}

/// Presets offered for manual selection (`--get-options`).
pub fn search_options() -> Vec<ToolOption> {
    [
        ("Direct Web Search (single)", "--mode single"),
        ("Queued Web Searches", "--mode queue --separator=;"),
        ("Extract and Search (prompt-driven)", "--mode extract"),
    ]
    .into_iter()
    .map(|(name, args)| ToolOption {
        name: name.to_string(),
        args: args.to_string(),
    })
    .collect()
}

/// Definition reported to a dispatcher (`--get-definition`).
pub fn search_definition() -> ToolDefinition {
    let modes: Vec<String> = ModeArg::value_variants()
        .iter()
        .filter_map(|mode| mode.to_possible_value())
        .map(|value| value.get_name().to_string())
        .collect();

    ToolDefinition {
        name: "scout-search".to_string(),
        description: "Search the web and answer with numbered source citations. \
            'single' searches one optimized query, 'queue' searches each \
            separated query, 'extract' derives several queries from the prompt."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "Question or queries to search for"},
                "mode": {"type": "string", "enum": modes},
                "separator": {"type": "string", "description": "Query separator for queue mode"}
            },
            "required": ["prompt"]
        }),
    }
}
