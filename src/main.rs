//! Scout CLI entry point.

use anyhow::Result;
use clap::Parser;
use scout::cli::commands::{self, CommandFailed};
use scout::cli::{Cli, Commands};
use scout::config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        // Already reported by the command itself.
        Err(e) => match e.downcast_ref::<CommandFailed>() {
            Some(failed) => ExitCode::from(failed.code),
            None => {
                eprintln!("Error: {:?}", e);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries answers and JSON, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("scout={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = match &config_path {
        Some(path) => Settings::load_from(Some(path))?,
        None => Settings::load()?,
    };

    match &cli.command {
        Commands::Search(args) => {
            commands::run_search(args, settings).await?;
        }

        Commands::Tools { action } => {
            commands::run_tools(action, settings).await?;
        }

        Commands::Chat { prompt, backend } => {
            commands::run_chat(prompt, backend, settings).await?;
        }

        Commands::Serve {
            host,
            port,
            backend,
        } => {
            commands::run_serve(host, *port, backend, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, config_path.as_deref()).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path.as_deref())?;
        }
    }

    Ok(())
}
