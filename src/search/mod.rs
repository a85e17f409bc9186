//! Web search: query formulation, the search backend and the iterative
//! coordinator that drives them.

pub mod coordinator;
pub mod formulator;
mod searxng;

pub use coordinator::{
    ConvergencePolicy, IterativeSearchCoordinator, QueryResults, QueryRound, ResultCountThreshold,
    SearchLog, StopReason,
};
pub use formulator::{parse_query_array, QueryFormulator};
pub use searxng::SearxngClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

/// Characters of result content kept before truncation.
pub const MAX_CONTENT_CHARS: usize = 800;

/// Marker appended to truncated content.
pub const ELLIPSIS: &str = "...";

/// A normalized search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Snippet, at most [`MAX_CONTENT_CHARS`] plus [`ELLIPSIS`].
    pub content: String,
    /// Publication date as reported upstream, or `"Unknown"`.
    pub published: String,
}

impl SearchResult {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        content: &str,
        published: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: truncate_content(content),
            published: published.unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Build from one upstream result object.
    ///
    /// Returns `None` unless `url`, `title` and `content` are all present.
    pub(crate) fn from_raw(raw: &Value) -> Option<Self> {
        let url = raw.get("url")?.as_str()?;
        let title = raw.get("title")?.as_str()?;
        let content = raw.get("content")?.as_str()?;
        let published = raw
            .get("publishedDate")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self::new(title, url, content, published))
    }
}

/// Cap `content` at [`MAX_CONTENT_CHARS`] characters, marking the cut.
pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}{}", &content[..cut], ELLIPSIS),
        None => content.to_string(),
    }
}

/// A web search service.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one query, surfacing transport and protocol errors.
    async fn try_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;

    /// Run one query. Failures are logged and yield no results.
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        match self.try_search(query, max_results).await {
            Ok(results) => results,
            Err(e) if e.is_recoverable() => {
                warn!("Search failed for query '{}': {}", query, e);
                Vec::new()
            }
            Err(e) => {
                error!("Search for query '{}' failed unexpectedly: {}", query, e);
                Vec::new()
            }
        }
    }
}
