//! Chat-completion client for the LLM backend.
//!
//! [`ChatModel`] is the seam every orchestration component talks through;
//! [`HttpModelClient`] implements it against an OpenAI-compatible endpoint.

mod client;
mod message;
mod sse;

pub use client::HttpModelClient;
pub use message::{ConversationState, FunctionCall, Message, Role, ToolCall};

use crate::error::Result;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Sampling temperature; the backend default when `None`.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Tool definitions offered for function calling.
    pub tools: Vec<ToolDefinition>,
}

impl CompletionOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// An item of a token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text fragment.
    Token(String),
    /// Graceful end of generation, either `[DONE]` or the upstream closing.
    Done,
}

/// A finite, single-pass stream of tokens.
///
/// Yields tokens followed by exactly one [`StreamEvent::Done`], or an `Err`
/// if the connection fails midway. Dropping it closes the connection.
pub type TokenStream = BoxStream<'static, Result<StreamEvent>>;

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a non-streaming completion and return the assistant message.
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<Message>;

    /// Run a streaming completion.
    async fn stream(&self, messages: &[Message], options: &CompletionOptions)
        -> Result<TokenStream>;
}

/// Run a completion and return its trimmed text content.
pub async fn complete_text(
    model: &dyn ChatModel,
    messages: &[Message],
    options: &CompletionOptions,
) -> Result<String> {
    let message = model.complete(messages, options).await?;
    Ok(message.text().trim().to_string())
}
