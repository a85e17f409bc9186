//! Tool discovery and per-session capability catalog.

use super::{ScriptTool, Tool, ToolDefinition};
use crate::error::{Result, ScoutError};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// The set of tools available to a session.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every supported script in `dir`.
    ///
    /// Files with unsupported extensions and hidden files are skipped. A
    /// missing directory yields an empty registry.
    #[instrument(skip(describe_timeout))]
    pub fn scan(dir: &Path, describe_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();

        if !dir.exists() {
            warn!("Tools directory {:?} does not exist", dir);
            return Ok(registry);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                !path
                    .file_name()
                    .map(|name| name.to_string_lossy().starts_with('.'))
                    .unwrap_or(true)
            })
            .collect();
        paths.sort();

        for path in paths {
            match ScriptTool::new(path.clone(), describe_timeout) {
                Some(tool) => registry.register(Arc::new(tool)),
                None => debug!("Skipping unsupported file {:?}", path),
            }
        }

        info!("Found {} tools in {:?}", registry.len(), dir);
        Ok(registry)
    }

    /// Add a tool. A tool with the same id replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|existing| existing.id() != tool.id());
        self.tools.push(tool);
    }

    /// Identifiers of all registered tools, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.iter().map(|t| t.id().to_string()).collect();
        ids.sort();
        ids
    }

    /// Look up a tool by identifier.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|tool| tool.id() == id)
            .cloned()
            .ok_or_else(|| ScoutError::ToolNotFound(id.to_string()))
    }

    /// Describe a single tool.
    pub async fn describe(&self, id: &str) -> Result<ToolDefinition> {
        self.get(id)?.describe().await
    }

    /// Describe all tools concurrently. Tools that fail are logged and left out.
    #[instrument(skip(self), fields(tools = self.tools.len()))]
    pub async fn catalog(&self) -> ToolCatalog {
        let described = join_all(self.tools.iter().map(|tool| async move {
            (tool.id().to_string(), tool.describe().await)
        }))
        .await;

        let mut entries = Vec::with_capacity(described.len());
        for (id, result) in described {
            match result {
                Ok(definition) => entries.push((id, definition)),
                Err(e) => warn!("Excluding tool {}: {}", id, e),
            }
        }

        ToolCatalog { entries }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Definitions of the describable tools, valid for one orchestration call.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<(String, ToolDefinition)>,
}

impl ToolCatalog {
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|(_, def)| def.clone()).collect()
    }

    /// Definition of the tool with identifier `id`.
    pub fn get(&self, id: &str) -> Option<&ToolDefinition> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, def)| def)
    }

    /// Map a name chosen by the model to a tool id.
    ///
    /// Matches the advertised definition name first, then the tool id.
    pub fn resolve(&self, name: &str) -> Option<(&str, &ToolDefinition)> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|(_, def)| def.name == name)
            .or_else(|| self.entries.iter().find(|(id, _)| id == name))
            .map(|(id, def)| (id.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
