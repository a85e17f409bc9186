//! CLI command implementations.

mod chat;
mod config;
mod doctor;
mod search;
mod serve;
mod tools;

pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use search::run_search;
pub use serve::run_serve;
pub use tools::run_tools;

use crate::config::Settings;
use crate::error::ScoutError;
use crate::orchestrator::Orchestrator;
use std::io::IsTerminal;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::error;

/// A command that already reported its failure and exits with `code`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("command failed with exit status {code}")]
pub struct CommandFailed {
    pub code: u8,
}

impl CommandFailed {
    /// Clamp a process status into the 1..=255 range of a failing exit code.
    pub fn new(status: i32) -> Self {
        Self {
            code: status.clamp(1, 255) as u8,
        }
    }
}

/// Join positional words into the input, falling back to piped stdin.
async fn read_input(words: &[String]) -> anyhow::Result<String> {
    let joined = words.join(" ");
    if !joined.trim().is_empty() || std::io::stdin().is_terminal() {
        return Ok(joined.trim().to_string());
    }

    let mut piped = String::new();
    tokio::io::stdin().read_to_string(&mut piped).await?;
    Ok(piped.trim().to_string())
}

/// Message placed in the JSON error object.
fn error_message(err: &ScoutError) -> String {
    match err {
        ScoutError::InvalidInput(msg) | ScoutError::NoQueries(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Print the JSON error object and return the failure for `main` to exit with.
fn fail(msg: &str) -> anyhow::Error {
    super::Output::json_error(msg);
    CommandFailed::new(1).into()
}

/// Build the orchestrator, reporting setup failures as the JSON error object.
fn orchestrator(settings: Settings) -> anyhow::Result<Orchestrator> {
    Orchestrator::new(settings).map_err(|e| {
        error!("Setup failed: {}", e);
        fail(&error_message(&e))
    })
}
