//! Configuration settings for Scout.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub coordinator: CoordinatorSettings,
    pub tools: ToolSettings,
    pub prompts: PromptSettings,
}

/// LLM backend settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Chat-completions endpoint (OpenAI compatible).
    pub endpoint: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Request timeout in seconds, for both streaming and non-streaming calls.
    pub request_timeout_secs: u64,
    /// Sampling temperature used when a call does not set its own.
    pub temperature: f32,
    /// Optional bearer token. Never logged.
    pub api_key: Option<String>,
    /// Send tool definitions in the request `tools` field instead of relying
    /// only on the prompt. Many local backends do not support it.
    pub native_function_calling: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/v1/chat/completions".to_string(),
            model: "koboldcpp".to_string(),
            request_timeout_secs: crate::http::DEFAULT_LLM_TIMEOUT_SECS,
            temperature: 0.7,
            api_key: None,
            native_function_calling: false,
        }
    }
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("native_function_calling", &self.native_function_calling)
            .finish()
    }
}

/// Search backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// SearxNG search endpoint.
    pub endpoint: String,
    /// Maximum results kept per query.
    pub max_results: usize,
    /// Timeout for a single search request in seconds.
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5003/search".to_string(),
            max_results: 8,
            timeout_secs: 30,
        }
    }
}

/// Iterative search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Maximum number of search rounds.
    pub max_iterations: usize,
    /// Stop once this many results have been gathered.
    pub min_results_threshold: usize,
    /// Maximum queries accepted from one extraction.
    pub max_queries: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            min_results_threshold: 5,
            max_queries: 8,
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Directory scanned for tool scripts.
    pub dir: String,
    /// Timeout for `--get-definition` / `--get-options` calls in seconds.
    pub describe_timeout_secs: u64,
    /// Timeout for a tool execution in seconds.
    pub execution_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            dir: "~/.scout/tools".to_string(),
            describe_timeout_secs: 30,
            execution_timeout_secs: 300,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// TOML file overriding the built-in system prompts.
    pub custom_file: Option<String>,
}

/// The flat configuration handed to each component at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub llm_endpoint: String,
    pub search_endpoint: String,
    pub model_name: String,
    pub request_timeout: Duration,
    pub max_search_results: usize,
    pub max_iterations: usize,
    pub min_results_threshold: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Settings::default().orchestrator_config()
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ScoutError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scout")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded tools directory path.
    pub fn tools_dir(&self) -> PathBuf {
        Self::expand_path(&self.tools.dir)
    }

    pub fn describe_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.describe_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.execution_timeout_secs)
    }

    /// Flatten into the configuration the orchestration components consume.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            llm_endpoint: self.llm.endpoint.clone(),
            search_endpoint: self.search.endpoint.clone(),
            model_name: self.llm.model.clone(),
            request_timeout: Duration::from_secs(self.llm.request_timeout_secs),
            max_search_results: self.search.max_results,
            max_iterations: self.coordinator.max_iterations,
            min_results_threshold: self.coordinator.min_results_threshold,
        }
    }
}
