//! Script files as tools, launched by an interpreter chosen from the extension.

use super::process::run_process;
use super::{Tool, ToolDefinition, ToolExecutionResult, ToolInput, ToolOption};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Flag asking a tool for its JSON definition.
pub const DEFINITION_FLAG: &str = "--get-definition";

/// Flag asking a tool for its manual-selection presets.
pub const OPTIONS_FLAG: &str = "--get-options";

/// Interpreter used to run a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launcher {
    Python,
    Shell,
    Node,
}

impl Launcher {
    /// File extensions with a known launcher.
    pub const EXTENSIONS: [&'static str; 3] = ["py", "sh", "js"];

    /// Pick the launcher for a script path, `None` for unsupported extensions.
    pub fn for_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "py" => Some(Launcher::Python),
            "sh" => Some(Launcher::Shell),
            "js" => Some(Launcher::Node),
            _ => None,
        }
    }

    /// Program the script is passed to.
    pub fn program(&self) -> &'static str {
        match self {
            Launcher::Python if cfg!(windows) => "python",
            Launcher::Python => "python3",
            Launcher::Shell => "bash",
            Launcher::Node => "node",
        }
    }
}

/// A tool implemented by a script file.
#[derive(Debug, Clone)]
pub struct ScriptTool {
    id: String,
    path: PathBuf,
    launcher: Launcher,
    describe_timeout: Duration,
}

impl ScriptTool {
    /// Wrap a script, or `None` if its extension has no launcher.
    pub fn new(path: PathBuf, describe_timeout: Duration) -> Option<Self> {
        let launcher = Launcher::for_path(&path)?;
        let id = path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            id,
            path,
            launcher,
            describe_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn launcher(&self) -> Launcher {
        self.launcher
    }

    async fn run(&self, args: &[OsString], timeout: Duration) -> Result<ToolExecutionResult> {
        run_process(self.launcher.program(), &self.path, args, timeout)
            .await
            .map_err(|e| ScoutError::ToolExecutionFailed {
                tool: self.id.clone(),
                reason: if e.kind() == std::io::ErrorKind::NotFound {
                    format!("launcher '{}' not found", self.launcher.program())
                } else {
                    e.to_string()
                },
            })
    }

    /// Run a self-description flag and return stdout, or `ToolDescribeFailed`.
    async fn query(&self, flag: &str) -> Result<String> {
        let describe_failed = |reason: String| ScoutError::ToolDescribeFailed {
            tool: self.id.clone(),
            reason,
        };

        let result = self
            .run(&[OsString::from(flag)], self.describe_timeout)
            .await
            .map_err(|e| describe_failed(e.to_string()))?;

        if result.timed_out {
            return Err(describe_failed(format!(
                "timed out after {}s",
                self.describe_timeout.as_secs()
            )));
        }
        if result.exit_status != 0 {
            return Err(describe_failed(format!(
                "exit status {}: {}",
                result.exit_status,
                result.stderr.trim()
            )));
        }

        Ok(result.stdout)
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(tool = %self.id))]
    async fn describe(&self) -> Result<ToolDefinition> {
        let stdout = self.query(DEFINITION_FLAG).await?;
        let definition: ToolDefinition =
            serde_json::from_str(stdout.trim()).map_err(|e| ScoutError::ToolDescribeFailed {
                tool: self.id.clone(),
                reason: format!("invalid definition JSON: {e}"),
            })?;

        if definition.name.trim().is_empty() {
            return Err(ScoutError::ToolDescribeFailed {
                tool: self.id.clone(),
                reason: "definition has an empty name".to_string(),
            });
        }

        debug!("Described as '{}'", definition.name);
        Ok(definition)
    }

    #[instrument(skip(self), fields(tool = %self.id))]
    async fn options(&self) -> Result<Vec<ToolOption>> {
        let stdout = self.query(OPTIONS_FLAG).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| ScoutError::ToolDescribeFailed {
            tool: self.id.clone(),
            reason: format!("invalid options JSON: {e}"),
        })
    }

    #[instrument(skip(self, input), fields(tool = %self.id))]
    async fn execute(&self, input: &ToolInput, timeout: Duration) -> Result<ToolExecutionResult> {
        self.run(&input.to_args(), timeout).await
    }
}
