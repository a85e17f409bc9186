//! Accumulated evidence and its numbered rendering.

use crate::search::{SearchLog, SearchResult};
use serde::Serialize;

/// Evidence gathered under one heading.
#[derive(Debug, Clone, PartialEq)]
enum Group {
    Query {
        query: String,
        results: Vec<SearchResult>,
    },
    Tool {
        tool: String,
        output: String,
    },
}

/// A citable piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// 1-based position in append order; the `N` of `[Source N]`.
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// Evidence for one synthesis call, numbered in the order it was appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    groups: Vec<Group>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every query and its results from a search log.
    pub fn from_log(log: &SearchLog) -> Self {
        let mut evidence = Self::new();
        for entry in log.results_by_query() {
            evidence.push_query(&entry.query, entry.results.clone());
        }
        evidence
    }

    /// Append the results of one query. A query without results is kept so
    /// the model sees that it was tried.
    pub fn push_query(&mut self, query: &str, results: Vec<SearchResult>) {
        self.groups.push(Group::Query {
            query: query.to_string(),
            results,
        });
    }

    /// Append the output of a tool run as one source.
    pub fn push_tool_output(&mut self, tool: &str, output: &str) {
        self.groups.push(Group::Tool {
            tool: tool.to_string(),
            output: output.trim().to_string(),
        });
    }

    /// Number of citable sources.
    pub fn source_count(&self) -> usize {
        self.groups
            .iter()
            .map(|group| match group {
                Group::Query { results, .. } => results.len(),
                Group::Tool { .. } => 1,
            })
            .sum()
    }

    /// True when there is nothing to cite.
    pub fn is_empty(&self) -> bool {
        self.source_count() == 0
    }

    /// Queries in append order.
    pub fn queries(&self) -> Vec<&str> {
        self.groups
            .iter()
            .filter_map(|group| match group {
                Group::Query { query, .. } => Some(query.as_str()),
                Group::Tool { .. } => None,
            })
            .collect()
    }

    /// All sources, numbered from 1 in append order.
    pub fn sources(&self) -> Vec<Source> {
        let mut sources = Vec::with_capacity(self.source_count());
        for group in &self.groups {
            match group {
                Group::Query { results, .. } => {
                    for result in results {
                        sources.push(Source {
                            index: sources.len() + 1,
                            title: result.title.clone(),
                            url: result.url.clone(),
                        });
                    }
                }
                Group::Tool { tool, .. } => sources.push(Source {
                    index: sources.len() + 1,
                    title: format!("Output of {tool}"),
                    url: tool_url(tool),
                }),
            }
        }
        sources
    }

    /// Render the user turn handed to the model.
    pub fn to_context(&self, prompt: &str) -> String {
        let mut context = format!("User's Original Prompt: {}\n\n", prompt);
        let rule = "-".repeat(40);
        let mut index = 1;
        let mut query_number = 0;
        let mut tool_number = 0;

        for group in &self.groups {
            match group {
                Group::Query { query, results } => {
                    query_number += 1;
                    context.push_str(&format!("Search Query {}: {}\n{}\n", query_number, query, rule));
                    if results.is_empty() {
                        context.push_str("  No results found for this query.\n\n");
                    }
                    for result in results {
                        context.push_str(&format!(
                            "Source [{}]:\n  Title: {}\n  URL: {}\n  Published: {}\n  Content: {}\n\n",
                            index, result.title, result.url, result.published, result.content
                        ));
                        index += 1;
                    }
                }
                Group::Tool { tool, output } => {
                    tool_number += 1;
                    context.push_str(&format!(
                        "Tool Output {}: {}\n{}\nSource [{}]:\n{}\n\n",
                        tool_number, tool, rule, index, output
                    ));
                    index += 1;
                }
            }
        }

        context
    }
}

fn tool_url(tool: &str) -> String {
    format!("tool://{}", tool)
}

/// The trailing list mapping citation numbers to URLs.
pub fn sources_section(sources: &[Source]) -> String {
    let mut section = String::from("\n\nSources:\n");
    for source in sources {
        section.push_str(&format!("[{}] {}\n", source.index, source.url));
    }
    section
}
