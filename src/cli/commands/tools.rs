//! Tools command implementation.

use super::{error_message, fail, orchestrator, read_input, CommandFailed};
use crate::cli::{Output, ToolsAction};
use crate::config::Settings;
use crate::tools::{ToolInput, ToolRegistry};
use anyhow::Result;
use console::style;
use std::time::Duration;
use tracing::error;

/// Run a tools subcommand.
pub async fn run_tools(action: &ToolsAction, mut settings: Settings) -> Result<()> {
    match action {
        ToolsAction::List => list_tools(&settings).await,

        ToolsAction::Describe { tool } => {
            let registry = scan(&settings)?;
            let definition = registry.describe(tool).await?;
            Output::json(&definition)
        }

        ToolsAction::Options { tool } => {
            let registry = scan(&settings)?;
            let options = registry.get(tool)?.options().await?;
            Output::json(&options)
        }

        ToolsAction::Run {
            tool,
            timeout,
            args,
        } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.execution_timeout());
            let registry = scan(&settings)?;
            let result = registry
                .get(tool)?
                .execute(&ToolInput::Argv(args.clone()), timeout)
                .await?;

            print!("{}", result.stdout);
            if !result.stderr.trim().is_empty() {
                eprintln!("{}", result.stderr.trim_end());
            }
            if result.timed_out {
                anyhow::bail!("{} timed out after {}s", tool, timeout.as_secs());
            }
            if result.exit_status != 0 {
                Output::error(&format!("{} exited with status {}", tool, result.exit_status));
                return Err(CommandFailed::new(result.exit_status).into());
            }
            Ok(())
        }

        ToolsAction::Auto {
            prompt,
            json,
            backend,
        } => {
            let prompt = read_input(prompt).await?;
            if prompt.is_empty() {
                return Err(fail("Empty input"));
            }

            backend.apply(&mut settings);
            let orchestrator = orchestrator(settings)?;

            let spinner = Output::spinner("Choosing a tool...");
            let result = orchestrator.tool_answer(&prompt).await;
            spinner.finish_and_clear();

            match result {
                Ok(answer) if *json => Output::json(&answer),
                Ok(answer) => {
                    Output::info(&format!("Used {}", answer.outcome.tool_id));
                    println!("{}", answer.answer);
                    Ok(())
                }
                Err(e) => {
                    error!("Tool dispatch failed: {}", e);
                    Err(fail(&error_message(&e)))
                }
            }
        }
    }
}

fn scan(settings: &Settings) -> Result<ToolRegistry> {
    Ok(ToolRegistry::scan(
        &settings.tools_dir(),
        settings.describe_timeout(),
    )?)
}

async fn list_tools(settings: &Settings) -> Result<()> {
    let dir = settings.tools_dir();
    let registry = scan(settings)?;

    Output::header(&format!("Tools in {}", dir.display()));
    if registry.is_empty() {
        Output::warning("No tools found.");
        Output::info(&format!(
            "Add .py, .sh or .js scripts to {} (see tools.dir in the config).",
            dir.display()
        ));
        return Ok(());
    }

    let catalog = registry.catalog().await;
    for id in registry.list_tools() {
        match catalog.get(&id) {
            Some(definition) => Output::list_item(&format!(
                "{} {}",
                style(&id).bold(),
                style(&definition.description).dim()
            )),
            None => Output::list_item(&format!(
                "{} {}",
                style(&id).bold(),
                style("(could not describe itself)").red()
            )),
        }
    }
    println!();
    Output::success(&format!(
        "{} of {} tools available",
        catalog.len(),
        registry.len()
    ));

    Ok(())
}
