//! Streaming chat command.

use super::read_input;
use crate::cli::{BackendArgs, Output};
use crate::config::Settings;
use crate::llm::StreamEvent;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use tracing::{debug, info};

/// Stream a reply to `prompt` on stdout. Ctrl-C stops the stream.
pub async fn run_chat(prompt: &[String], backend: &BackendArgs, mut settings: Settings) -> Result<()> {
    let prompt = read_input(prompt).await?;
    if prompt.is_empty() {
        anyhow::bail!("Empty input");
    }

    backend.apply(&mut settings);
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Waiting for the model...");
    let opened = orchestrator.chat_stream(&prompt).await;
    spinner.finish_and_clear();
    let mut tokens = opened?;

    let mut stdout = std::io::stdout();
    let mut received = 0usize;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                // Dropping the stream closes the upstream connection.
                println!();
                Output::warning("Cancelled.");
                info!("Chat cancelled after {} tokens", received);
                return Ok(());
            }
            event = tokens.next() => match event {
                Some(Ok(StreamEvent::Token(token))) => {
                    received += 1;
                    print!("{}", token);
                    stdout.flush()?;
                }
                Some(Ok(StreamEvent::Done)) | None => break,
                Some(Err(e)) => {
                    println!();
                    Output::error(&format!("Stream failed: {}", e));
                    return Err(e.into());
                }
            }
        }
    }

    println!();
    debug!("Chat finished after {} tokens", received);
    Ok(())
}
