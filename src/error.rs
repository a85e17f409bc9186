//! Error types for Scout.

use std::time::Duration;
use thiserror::Error;

/// Library-level error type for Scout operations.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure or timeout talking to the LLM or search backend.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The upstream answered, but not in the expected shape.
    #[error("Unexpected upstream response: {0}")]
    UpstreamProtocol(String),

    #[error("Tool '{tool}' could not describe itself: {reason}")]
    ToolDescribeFailed { tool: String, reason: String },

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Tool '{tool}' timed out after {}s", timeout.as_secs())]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The model's tool decision could not be parsed.
    #[error("Could not parse tool decision: {0}")]
    DecisionParse(String),

    #[error("{0}")]
    NoQueries(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl ScoutError {
    /// Whether the caller should degrade (fewer or no results) instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScoutError::UpstreamUnavailable(_) | ScoutError::UpstreamProtocol(_)
        )
    }

    /// Map a transport error from reqwest, keeping the URL out of the message.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timed out"
        } else if err.is_connect() {
            "connection failed"
        } else if let Some(status) = err.status() {
            return ScoutError::UpstreamUnavailable(format!("{context}: HTTP {status}"));
        } else {
            "request failed"
        };
        ScoutError::UpstreamUnavailable(format!("{context}: {kind}: {}", err.without_url()))
    }
}

/// Result type alias for Scout operations.
pub type Result<T> = std::result::Result<T, ScoutError>;
