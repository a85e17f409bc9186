//! HTTP implementation of [`ChatModel`] for OpenAI-compatible backends.

use super::sse::{parse_data, SseData};
use super::{ChatModel, CompletionOptions, Message, Role, StreamEvent, TokenStream, ToolCall};
use crate::config::OrchestratorConfig;
use crate::error::{Result, ScoutError};
use crate::http::create_client;
use crate::tools::ToolDefinition;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

/// Chat-completions client over HTTP.
pub struct HttpModelClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    default_temperature: Option<f32>,
}

impl HttpModelClient {
    /// Create a client for the configured endpoint and model.
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config.request_timeout)?,
            endpoint: config.llm_endpoint.clone(),
            model: config.model_name.clone(),
            api_key: None,
            default_temperature: None,
        })
    }

    /// Send a bearer token with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Temperature used when a call does not set one.
    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[Message], options: &CompletionOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(temperature) = options.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !options.tools.is_empty() {
            body["tools"] = json!(chat_tools(&options.tools));
            body["tool_choice"] = json!("auto");
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScoutError::from_transport("LLM request", e))?;

        response
            .error_for_status()
            .map_err(|e| ScoutError::from_transport("LLM request", e))
    }
}

#[async_trait]
impl ChatModel for HttpModelClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<Message> {
        let body = self.request_body(messages, options, false);
        debug!("Calling LLM at {}", self.endpoint);

        let response = self.send(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ScoutError::from_transport("LLM response", e))?;

        parse_completion(&text)
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream> {
        let body = self.request_body(messages, options, true);
        debug!("Opening LLM stream at {}", self.endpoint);

        let response = self.send(&body).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(token_stream(chunks))
    }
}

/// Convert tool definitions into the function-calling `tools` schema.
fn chat_tools(definitions: &[ToolDefinition]) -> Vec<ChatCompletionTool> {
    definitions
        .iter()
        .map(|def| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: def.name.clone(),
                description: Some(def.description.clone()),
                parameters: Some(def.parameters.clone()),
                strict: None,
            },
        })
        .collect()
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Parse a non-streaming response body into the assistant message.
fn parse_completion(body: &str) -> Result<Message> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| ScoutError::UpstreamProtocol(format!("invalid completion body: {e}")))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ScoutError::UpstreamProtocol("missing choices[0]".to_string()))?;

    Ok(Message {
        role: Role::Assistant,
        content: choice.message.content,
        tool_call_id: None,
        name: None,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    })
}

/// Turn raw body chunks into a [`TokenStream`].
///
/// Nothing after `[DONE]` is read. A body that closes without the marker
/// still ends with [`StreamEvent::Done`].
fn token_stream(chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> TokenStream {
    let events = chunks.eventsource().boxed();

    futures::stream::unfold(Some(events), |events| async move {
        let mut events = events?;
        loop {
            match events.next().await {
                Some(Ok(event)) => match parse_data(&event.data) {
                    SseData::Token(token) => {
                        return Some((Ok(StreamEvent::Token(token)), Some(events)))
                    }
                    SseData::Done => return Some((Ok(StreamEvent::Done), None)),
                    SseData::Skip => {}
                },
                Some(Err(EventStreamError::Transport(e))) => {
                    warn!("LLM stream failed midway");
                    return Some((Err(ScoutError::from_transport("LLM stream", e)), None));
                }
                Some(Err(e)) => debug!("Skipping malformed stream event: {}", e),
                None => {
                    debug!("LLM stream closed without [DONE]");
                    return Some((Ok(StreamEvent::Done), None));
                }
            }
        }
    })
    .boxed()
}
