//! In-memory doubles for the model, search backend and tools.

use crate::error::{Result, ScoutError};
use crate::llm::{
    ChatModel, CompletionOptions, FunctionCall, Message, StreamEvent, TokenStream, ToolCall,
};
use crate::search::{SearchBackend, SearchResult};
use crate::tools::{Tool, ToolDefinition, ToolExecutionResult, ToolInput, ToolOption};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

enum Reply {
    Text(String),
    ToolCall(String, Value),
    Fail,
    /// Streams the text, then fails instead of finishing.
    BrokenStream(String),
}

/// A [`ChatModel`] answering from a queue of scripted replies.
///
/// Once the queue is empty every call fails.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(Vec<Message>, CompletionOptions)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.push(Reply::Text(text.to_string()))
    }

    pub fn reply_tool_call(self, name: &str, arguments: Value) -> Self {
        self.push(Reply::ToolCall(name.to_string(), arguments))
    }

    pub fn fail(self) -> Self {
        self.push(Reply::Fail)
    }

    pub fn broken_stream(self, text: &str) -> Self {
        self.push(Reply::BrokenStream(text.to_string()))
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Messages of every call, in order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    /// Options of every call, in order.
    pub fn options(&self) -> Vec<CompletionOptions> {
        self.calls.lock().unwrap().iter().map(|(_, o)| o.clone()).collect()
    }

    fn next(&self, messages: &[Message], options: &CompletionOptions) -> Reply {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail)
    }
}

fn unavailable() -> ScoutError {
    ScoutError::UpstreamUnavailable("scripted failure".to_string())
}

fn tokens(text: &str) -> Vec<Result<StreamEvent>> {
    text.split_inclusive(' ')
        .map(|t| Ok(StreamEvent::Token(t.to_string())))
        .collect()
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<Message> {
        match self.next(messages, options) {
            Reply::Text(text) | Reply::BrokenStream(text) => Ok(Message::assistant(text)),
            Reply::ToolCall(name, arguments) => Ok(Message::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name,
                    arguments: arguments.to_string(),
                },
            }])),
            Reply::Fail => Err(unavailable()),
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        match self.next(messages, options) {
            Reply::Text(text) => {
                let mut events = tokens(&text);
                events.push(Ok(StreamEvent::Done));
                Ok(stream::iter(events).boxed())
            }
            Reply::BrokenStream(text) => {
                let mut events = tokens(&text);
                events.push(Err(unavailable()));
                Ok(stream::iter(events).boxed())
            }
            Reply::ToolCall(..) | Reply::Fail => Err(unavailable()),
        }
    }
}

/// A [`SearchBackend`] serving canned results per query.
#[derive(Default)]
pub struct StaticSearch {
    results: HashMap<String, Vec<SearchResult>>,
    unreachable: bool,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose every request fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Serve `count` generated results for `query`.
    pub fn with_results(self, query: &str, count: usize) -> Self {
        let slug = query.replace(' ', "-");
        let hits = (1..=count)
            .map(|n| {
                SearchResult::new(
                    format!("{query} #{n}"),
                    format!("https://example.com/{slug}/{n}"),
                    &format!("Snippet {n} about {query}"),
                    None,
                )
            })
            .collect();
        self.with_hits(query, hits)
    }

    pub fn with_hits(mut self, query: &str, hits: Vec<SearchResult>) -> Self {
        self.results.insert(query.to_string(), hits);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn try_search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(ScoutError::UpstreamUnavailable(
                "Search request: connection failed".to_string(),
            ));
        }
        let mut hits = self.results.get(query).cloned().unwrap_or_default();
        hits.truncate(max_results);
        Ok(hits)
    }
}

/// A [`Tool`] with canned output that counts its launches.
pub struct FakeTool {
    id: String,
    definition_name: String,
    describable: bool,
    stdout: String,
    stderr: String,
    exit_status: i32,
    timed_out: bool,
    launches: AtomicUsize,
    last_input: Mutex<Option<ToolInput>>,
}

impl FakeTool {
    pub fn new(id: &str, stdout: &str) -> Self {
        Self {
            id: id.to_string(),
            definition_name: id.to_string(),
            describable: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_status: 0,
            timed_out: false,
            launches: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    /// A tool whose self-description fails.
    pub fn undescribable(id: &str) -> Self {
        Self {
            describable: false,
            ..Self::new(id, "")
        }
    }

    pub fn with_definition_name(mut self, name: &str) -> Self {
        self.definition_name = name.to_string();
        self
    }

    pub fn with_exit_status(mut self, exit_status: i32, stderr: &str) -> Self {
        self.exit_status = exit_status;
        self.stderr = stderr.to_string();
        self
    }

    pub fn timing_out(mut self) -> Self {
        self.timed_out = true;
        self.exit_status = -1;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<ToolInput> {
        self.last_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for FakeTool {
    fn id(&self) -> &str {
        &self.id
    }

    async fn describe(&self) -> Result<ToolDefinition> {
        if !self.describable {
            return Err(ScoutError::ToolDescribeFailed {
                tool: self.id.clone(),
                reason: "exit status 1".to_string(),
            });
        }
        Ok(ToolDefinition {
            name: self.definition_name.clone(),
            description: format!("Fake {}", self.id),
            parameters: serde_json::json!({"type": "object", "properties": {}, "required": []}),
        })
    }

    async fn options(&self) -> Result<Vec<ToolOption>> {
        Ok(vec![ToolOption {
            name: "Default".to_string(),
            args: String::new(),
        }])
    }

    async fn execute(&self, input: &ToolInput, _timeout: Duration) -> Result<ToolExecutionResult> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some(input.clone());
        Ok(ToolExecutionResult {
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exit_status: self.exit_status,
            timed_out: self.timed_out,
        })
    }
}
