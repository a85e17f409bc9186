//! External tools: discovery, self-description and isolated execution.
//!
//! Every tool sits behind the [`Tool`] trait. [`ScriptTool`] adapts a script
//! file (launcher chosen by extension) to it; the [`ToolRegistry`] holds a
//! polymorphic collection and the [`Dispatcher`] lets the model pick one.

mod dispatcher;
mod process;
mod registry;
mod script;

pub use dispatcher::{parse_decision, DispatchOutcome, Dispatcher, ToolAnswer};
pub use registry::{ToolCatalog, ToolRegistry};
pub use script::{Launcher, ScriptTool};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::time::Duration;

/// Machine-readable capability definition reported by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the accepted arguments.
    #[serde(default = "empty_schema")]
    pub parameters: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}, "required": []})
}

impl ToolDefinition {
    /// Parameters listed as required by the schema.
    pub fn required(&self) -> Vec<&str> {
        self.parameters["required"]
            .as_array()
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// A preset offered for manual selection (`--get-options`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOption {
    pub name: String,
    pub args: String,
}

/// A request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Required parameters of `definition` absent from this request.
    pub fn missing_arguments<'a>(&self, definition: &'a ToolDefinition) -> Vec<&'a str> {
        definition
            .required()
            .into_iter()
            .filter(|name| !self.arguments.contains_key(*name))
            .collect()
    }
}

/// How arguments reach the tool process.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    /// Named arguments, passed as `--key value` flags.
    Named(Map<String, Value>),
    /// Raw command-line arguments, passed unchanged.
    Argv(Vec<String>),
}

impl ToolInput {
    /// Render as process arguments.
    ///
    /// Strings are passed verbatim, `true` becomes a bare flag, `false` and
    /// `null` are omitted, anything else is passed as JSON text.
    pub fn to_args(&self) -> Vec<OsString> {
        match self {
            ToolInput::Argv(argv) => argv.iter().map(OsString::from).collect(),
            ToolInput::Named(map) => {
                let mut args = Vec::with_capacity(map.len() * 2);
                for (key, value) in map {
                    let flag = format!("--{}", key);
                    match value {
                        Value::Null | Value::Bool(false) => {}
                        Value::Bool(true) => args.push(OsString::from(flag)),
                        Value::String(s) => {
                            args.push(OsString::from(flag));
                            args.push(OsString::from(s));
                        }
                        other => {
                            args.push(OsString::from(flag));
                            args.push(OsString::from(other.to_string()));
                        }
                    }
                }
                args
            }
        }
    }
}

/// Outcome of one tool process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; -1 when killed or terminated by a signal.
    pub exit_status: i32,
    pub timed_out: bool,
}

impl ToolExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_status == 0
    }
}

/// An external capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier (the script file name for script tools).
    fn id(&self) -> &str;

    /// Ask the tool for its definition.
    async fn describe(&self) -> Result<ToolDefinition>;

    /// Presets for manual selection.
    async fn options(&self) -> Result<Vec<ToolOption>>;

    /// Run the tool once in a fresh process.
    ///
    /// Returns `Err` only when the tool cannot be launched; timeouts and
    /// non-zero exits are reported in the result.
    async fn execute(&self, input: &ToolInput, timeout: Duration) -> Result<ToolExecutionResult>;
}
