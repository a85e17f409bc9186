//! Configuration module for Scout.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::Prompts;
pub use settings::{
    CoordinatorSettings, LlmSettings, OrchestratorConfig, PromptSettings, SearchSettings,
    Settings, ToolSettings,
};
