//! Model-driven tool selection and invocation.

use super::{ToolCallRequest, ToolCatalog, ToolExecutionResult, ToolInput, ToolRegistry};
use crate::config::Prompts;
use crate::error::{Result, ScoutError};
use crate::llm::{ChatModel, CompletionOptions, ConversationState, Message};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Token cap for the decision round; the reply is a single small JSON object.
const DECISION_MAX_TOKENS: u32 = 500;

/// Token cap for the summary round.
const SUMMARY_MAX_TOKENS: u32 = 4000;

/// A tool chosen by the model and the output of running it.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Identifier of the tool that ran.
    pub tool_id: String,
    pub request: ToolCallRequest,
    pub result: ToolExecutionResult,
}

impl DispatchOutcome {
    pub fn stdout(&self) -> &str {
        &self.result.stdout
    }
}

/// Final answer of a decide, run and summarise session.
#[derive(Debug, Clone, Serialize)]
pub struct ToolAnswer {
    pub answer: String,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

/// Lets the model pick one tool, runs it and reports the result.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ChatModel>,
    decision_prompt: String,
    summary_prompt: String,
    execution_timeout: Duration,
    native_function_calling: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ChatModel>,
        prompts: &Prompts,
        execution_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            model,
            decision_prompt: prompts.tool_decision.clone(),
            summary_prompt: prompts.tool_summary.clone(),
            execution_timeout,
            native_function_calling: false,
        }
    }

    /// Also offer the definitions through the backend's function-calling API.
    pub fn with_native_function_calling(mut self, enabled: bool) -> Self {
        self.native_function_calling = enabled;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Ask the model which tool to call for `prompt`.
    ///
    /// A reply that is neither a function call nor a `{tool, args}` object is
    /// a [`ScoutError::DecisionParse`]; it is not retried.
    #[instrument(skip(self, prompt, catalog), fields(tools = catalog.len()))]
    pub async fn decide(&self, prompt: &str, catalog: &ToolCatalog) -> Result<ToolCallRequest> {
        let definitions = catalog.definitions();
        let mut vars = HashMap::new();
        vars.insert(
            "tools".to_string(),
            serde_json::to_string_pretty(&definitions)?,
        );
        let system = Prompts::render(&self.decision_prompt, &vars);

        let mut options = CompletionOptions::default().with_max_tokens(DECISION_MAX_TOKENS);
        if self.native_function_calling {
            options = options.with_tools(definitions);
        }

        let reply = self
            .model
            .complete(&[Message::system(system), Message::user(prompt)], &options)
            .await?;

        let request = match reply.tool_calls.first() {
            Some(call) => ToolCallRequest {
                tool_name: call.function.name.clone(),
                arguments: parse_arguments(&call.function.arguments)?,
            },
            None => parse_decision(reply.text())?,
        };

        info!("Model chose tool '{}'", request.tool_name);
        Ok(request)
    }

    /// Run a registered tool directly, bypassing the model.
    #[instrument(skip(self, input))]
    pub async fn invoke(
        &self,
        tool_id: &str,
        input: &ToolInput,
        timeout: Duration,
    ) -> Result<ToolExecutionResult> {
        let tool = self.registry.get(tool_id)?;
        tool.execute(input, timeout).await
    }

    /// Resolve and run a request against the session's catalog.
    ///
    /// Unknown tools fail before any process is launched. A timeout or a
    /// non-zero exit is reported as an error carrying the tool's name.
    #[instrument(skip(self, request, catalog), fields(tool = %request.tool_name))]
    pub async fn invoke_request(
        &self,
        request: ToolCallRequest,
        catalog: &ToolCatalog,
    ) -> Result<DispatchOutcome> {
        let (tool_id, definition) = catalog
            .resolve(&request.tool_name)
            .ok_or_else(|| ScoutError::ToolNotFound(request.tool_name.clone()))?;

        let missing = request.missing_arguments(definition);
        if !missing.is_empty() {
            warn!(
                "Tool '{}' called without required arguments: {}",
                tool_id,
                missing.join(", ")
            );
        }

        let tool_id = tool_id.to_string();
        let input = ToolInput::Named(request.arguments.clone());
        let result = self
            .invoke(&tool_id, &input, self.execution_timeout)
            .await?;

        if result.timed_out {
            return Err(ScoutError::ToolTimeout {
                tool: tool_id,
                timeout: self.execution_timeout,
            });
        }
        if result.exit_status != 0 {
            warn!(
                "Tool '{}' exited with {}: {}",
                tool_id,
                result.exit_status,
                result.stderr.trim()
            );
            return Err(ScoutError::ToolExecutionFailed {
                tool: tool_id,
                reason: format!("exit status {}: {}", result.exit_status, result.stderr.trim()),
            });
        }
        if !result.stderr.trim().is_empty() {
            debug!("Tool '{}' stderr: {}", tool_id, result.stderr.trim());
        }

        Ok(DispatchOutcome {
            tool_id,
            request,
            result,
        })
    }

    /// Describe all tools, let the model choose one and run it.
    #[instrument(skip(self, prompt))]
    pub async fn run_auto(&self, prompt: &str) -> Result<DispatchOutcome> {
        let catalog = self.registry.catalog().await;
        if catalog.is_empty() {
            return Err(ScoutError::InvalidInput(
                "No describable tools are available".to_string(),
            ));
        }

        let request = self.decide(prompt, &catalog).await?;
        self.invoke_request(request, &catalog).await
    }

    /// [`run_auto`](Self::run_auto), then ask the model to answer from the output.
    ///
    /// The tool output enters the conversation as a tool turn. If the summary
    /// round fails the raw tool output is returned as the answer.
    #[instrument(skip(self, prompt))]
    pub async fn answer(&self, prompt: &str) -> Result<ToolAnswer> {
        let outcome = self.run_auto(prompt).await?;

        let mut conversation = ConversationState::new(&self.summary_prompt);
        conversation.push_user(prompt);
        let call_id = conversation.push_tool_call(
            &outcome.tool_id,
            &Value::Object(outcome.request.arguments.clone()),
        );
        conversation.push_tool_result(&call_id, &outcome.tool_id, outcome.stdout());

        let options = CompletionOptions::default().with_max_tokens(SUMMARY_MAX_TOKENS);
        let answer = match self.model.complete(conversation.messages(), &options).await {
            Ok(reply) if !reply.text().trim().is_empty() => reply.text().trim().to_string(),
            Ok(_) => {
                warn!("Empty summary from model, returning raw tool output");
                outcome.stdout().trim().to_string()
            }
            Err(e) => {
                warn!("Summary round failed, returning raw tool output: {}", e);
                outcome.stdout().trim().to_string()
            }
        };

        Ok(ToolAnswer { answer, outcome })
    }
}

/// Parse a `{"tool": ..., "args": {...}}` decision out of free model text.
///
/// The first `{` to the last `}` is taken as the object, so surrounding prose
/// or code fences are tolerated.
pub fn parse_decision(text: &str) -> Result<ToolCallRequest> {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(ScoutError::DecisionParse(format!(
                "no JSON object in reply: {}",
                preview(text)
            )))
        }
    };

    let value: Value = serde_json::from_str(span)
        .map_err(|e| ScoutError::DecisionParse(format!("{e}: {}", preview(span))))?;

    let tool_name = value
        .get("tool")
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ScoutError::DecisionParse("missing \"tool\" field".to_string()))?
        .to_string();

    let arguments = match value.get("args").or_else(|| value.get("arguments")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(encoded)) => parse_arguments(encoded)?,
        Some(other) => {
            return Err(ScoutError::DecisionParse(format!(
                "\"args\" must be an object, got {other}"
            )))
        }
    };

    Ok(ToolCallRequest {
        tool_name,
        arguments,
    })
}

/// Decode JSON-encoded function-call arguments.
fn parse_arguments(encoded: &str) -> Result<Map<String, Value>> {
    if encoded.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(encoded) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ScoutError::DecisionParse(format!(
            "arguments must be an object, got {other}"
        ))),
        Err(e) => Err(ScoutError::DecisionParse(format!("invalid arguments: {e}"))),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::testing::{FakeTool, ScriptedModel};
    use serde_json::json;

    fn dispatcher(model: Arc<ScriptedModel>, tools: Vec<Arc<FakeTool>>) -> Dispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Dispatcher::new(
            Arc::new(registry),
            model,
            &Prompts::default(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_parse_decision_with_prose() {
        let request = parse_decision(
            "Sure!\n```json\n{\"tool\": \"stock-stats-tool.py\", \"args\": {\"ticker\": \"NVDA\"}}\n```",
        )
        .unwrap();
        assert_eq!(request.tool_name, "stock-stats-tool.py");
        assert_eq!(request.arguments["ticker"], "NVDA");
    }

    #[test]
    fn test_parse_decision_without_args() {
        let request = parse_decision(r#"{"tool": "clock.sh"}"#).unwrap();
        assert!(request.arguments.is_empty());
    }

    #[test]
    fn test_parse_decision_failures() {
        for reply in [
            "I would use the stock tool.",
            "{tool: stock}",
            r#"{"args": {}}"#,
            r#"{"tool": "x.py", "args": [1, 2]}"#,
        ] {
            assert!(
                matches!(parse_decision(reply), Err(ScoutError::DecisionParse(_))),
                "accepted {reply:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_launches_nothing() {
        let model = Arc::new(ScriptedModel::new().reply(r#"{"tool": "weather.py", "args": {}}"#));
        let stock = Arc::new(FakeTool::new("stock-stats-tool.py", "NVDA 120.5"));
        let dispatcher = dispatcher(model, vec![stock.clone()]);

        let err = dispatcher.run_auto("weather in Oslo").await.unwrap_err();

        assert!(matches!(err, ScoutError::ToolNotFound(name) if name == "weather.py"));
        assert_eq!(stock.launches(), 0);
    }

    #[tokio::test]
    async fn test_run_auto_invokes_chosen_tool() {
        let model = Arc::new(ScriptedModel::new().reply(
            r#"{"tool": "stock-stats-tool.py", "args": {"ticker": "NVDA"}}"#,
        ));
        let stock = Arc::new(FakeTool::new("stock-stats-tool.py", "NVDA 120.5"));
        let clock = Arc::new(FakeTool::new("clock.sh", "12:00"));
        let dispatcher = dispatcher(model.clone(), vec![stock.clone(), clock.clone()]);

        let outcome = dispatcher.run_auto("NVDA price").await.unwrap();

        assert_eq!(outcome.tool_id, "stock-stats-tool.py");
        assert_eq!(outcome.stdout(), "NVDA 120.5");
        assert_eq!(stock.launches(), 1);
        assert_eq!(clock.launches(), 0);
        assert_eq!(
            stock.last_input(),
            Some(ToolInput::Named(json!({"ticker": "NVDA"}).as_object().unwrap().clone()))
        );

        let system = model.calls()[0][0].text().to_string();
        assert!(system.contains("\"name\": \"clock.sh\""));
    }

    #[tokio::test]
    async fn test_native_tool_call_decision() {
        let model = Arc::new(
            ScriptedModel::new().reply_tool_call("clock.sh", json!({"zone": "UTC"})),
        );
        let clock = Arc::new(FakeTool::new("clock.sh", "12:00"));
        let dispatcher = dispatcher(model.clone(), vec![clock.clone()])
            .with_native_function_calling(true);

        let outcome = dispatcher.run_auto("time?").await.unwrap();

        assert_eq!(outcome.request.arguments["zone"], "UTC");
        assert_eq!(model.options()[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_decision_is_fatal() {
        let model = Arc::new(ScriptedModel::new().reply("use the clock"));
        let clock = Arc::new(FakeTool::new("clock.sh", "12:00"));
        let dispatcher = dispatcher(model, vec![clock.clone()]);

        assert!(matches!(
            dispatcher.run_auto("time?").await,
            Err(ScoutError::DecisionParse(_))
        ));
        assert_eq!(clock.launches(), 0);
    }

    #[tokio::test]
    async fn test_failed_and_timed_out_runs() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply(r#"{"tool": "bad.py"}"#)
                .reply(r#"{"tool": "slow.py"}"#),
        );
        let bad = Arc::new(FakeTool::new("bad.py", "").with_exit_status(2, "boom"));
        let slow = Arc::new(FakeTool::new("slow.py", "").timing_out());
        let dispatcher = dispatcher(model, vec![bad, slow]);

        match dispatcher.run_auto("x").await {
            Err(ScoutError::ToolExecutionFailed { tool, reason }) => {
                assert_eq!(tool, "bad.py");
                assert!(reason.contains("boom"));
            }
            other => panic!("Expected ToolExecutionFailed, got {:?}", other),
        }
        assert!(matches!(
            dispatcher.run_auto("x").await,
            Err(ScoutError::ToolTimeout { tool, .. }) if tool == "slow.py"
        ));
    }

    #[tokio::test]
    async fn test_answer_injects_tool_turn() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply(r#"{"tool": "stock-stats-tool.py", "args": {"ticker": "NVDA"}}"#)
                .reply("NVDA trades at 120.5."),
        );
        let stock = Arc::new(FakeTool::new("stock-stats-tool.py", "NVDA 120.5"));
        let dispatcher = dispatcher(model.clone(), vec![stock]);

        let answer = dispatcher.answer("NVDA price").await.unwrap();
        assert_eq!(answer.answer, "NVDA trades at 120.5.");

        let summary_round = &model.calls()[1];
        let roles: Vec<Role> = summary_round.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(summary_round[3].text(), "NVDA 120.5");
        assert_eq!(
            summary_round[3].tool_call_id.as_deref(),
            Some(summary_round[2].tool_calls[0].id.as_str())
        );
    }

    #[tokio::test]
    async fn test_answer_falls_back_to_tool_output() {
        let model = Arc::new(
            ScriptedModel::new()
                .reply(r#"{"tool": "clock.sh"}"#)
                .fail(),
        );
        let clock = Arc::new(FakeTool::new("clock.sh", "12:00\n"));
        let dispatcher = dispatcher(model, vec![clock]);

        let answer = dispatcher.answer("time?").await.unwrap();
        assert_eq!(answer.answer, "12:00");
    }

    #[tokio::test]
    async fn test_no_tools_available() {
        let model = Arc::new(ScriptedModel::new());
        let dispatcher = dispatcher(model.clone(), vec![]);

        assert!(matches!(
            dispatcher.run_auto("x").await,
            Err(ScoutError::InvalidInput(_))
        ));
        assert!(model.calls().is_empty());
    }
}
