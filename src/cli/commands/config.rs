//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Run the config command. `config_path` is the `--config` override.
pub fn run_config(action: &ConfigAction, settings: Settings, config_path: Option<&Path>) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            println!("{}", render(&settings)?);
        }

        ConfigAction::Path => {
            println!("{}", path.display());
        }

        ConfigAction::Init { force } => init(&settings, &path, *force)?,
    }

    Ok(())
}

/// Serialize settings for display, with the API key masked.
fn render(settings: &Settings) -> Result<String> {
    let mut shown = settings.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))
}

fn init(settings: &Settings, path: &PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        Output::info(&format!("Config file exists: {}", path.display()));
        Output::info("Use --force to overwrite it.");
    } else {
        settings.save_to(path)?;
        Output::success(&format!("Wrote config file: {}", path.display()));
    }

    let tools_dir = settings.tools_dir();
    if tools_dir.exists() {
        Output::info(&format!("Tools directory exists: {}", tools_dir.display()));
    } else {
        std::fs::create_dir_all(&tools_dir)?;
        Output::success(&format!("Created tools directory: {}", tools_dir.display()));
    }

    Ok(())
}
