//! Tool-calling agent executor.
//!
//! The agent repeatedly asks the model for the next step: either a batch of
//! tool calls, whose results are appended to the scratchpad, or a final
//! answer, which is returned as raw JSON (see [`crate::output`]).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::Error;
use crate::message::{Content, Message, ToolCall};
use crate::output::OUTPUT_KEY;
use crate::prompt::PromptTemplate;
use crate::provider::{CompletionRequest, Provider};
use crate::tool::ToolRegistry;

/// Something that turns a research query into raw, untyped agent output.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn invoke(&self, query: &str) -> Result<Value, Error>;
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model override; falls back to the provider default.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Extra parameters passed through to the API.
    pub parameters: HashMap<String, Value>,
    /// Maximum agentic loop iterations.
    pub max_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            max_tokens: None,
            parameters: HashMap::new(),
            max_iterations: 15,
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }
}

pub struct ToolCallingAgent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    prompt: PromptTemplate,
    config: AgentConfig,
}

impl ToolCallingAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        prompt: PromptTemplate,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            prompt,
            config,
        }
    }

    fn build_request(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut request = CompletionRequest::new(messages).with_tools(self.tools.definitions());
        if let Some(model) = &self.config.model {
            request = request.with_model(model.as_str());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if !self.config.parameters.is_empty() {
            request = request.with_extra(self.config.parameters.clone());
        }
        request
    }
}

#[async_trait]
impl AgentExecutor for ToolCallingAgent {
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    async fn invoke(&self, query: &str) -> Result<Value, Error> {
        let mut scratchpad: Vec<Message> = Vec::new();

        for iteration in 0..self.config.max_iterations {
            let messages = self.prompt.render(query, &[], &scratchpad);
            debug!(
                iteration = iteration,
                message_count = messages.len(),
                "Agent iteration starting"
            );

            let response = self.provider.complete(self.build_request(messages)).await?;

            if !response.message.tool_calls.is_empty() {
                debug!(tool_count = response.message.tool_calls.len(), "Agent executing tools");

                // Content alongside tool calls is reasoning noise; keep only the calls.
                scratchpad.push(Message::assistant_with_tool_calls(
                    "",
                    response.message.tool_calls.clone(),
                ));

                for tool_call in &response.message.tool_calls {
                    let result = execute_tool(&self.tools, tool_call).await;
                    scratchpad.push(Message::tool_result(&tool_call.id, &tool_call.name, result));
                }

                continue;
            }

            info!(
                iterations = iteration + 1,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                "Agent finished"
            );
            return Ok(final_output(query, response.message.content));
        }

        warn!(max_iterations = self.config.max_iterations, "Agent exceeded max iterations");
        Err(Error::MaxIterations(self.config.max_iterations))
    }
}

/// Plain string answers pass through; chunked answers are wrapped in an
/// `{"input", "output"}` envelope.
fn final_output(query: &str, content: Content) -> Value {
    match content {
        Content::Text(text) => Value::String(text),
        Content::Blocks(blocks) => json!({ "input": query, (OUTPUT_KEY): blocks }),
    }
}

/// Execute a single tool call. Failures become `Error: ...` text for the model.
async fn execute_tool(registry: &ToolRegistry, tool_call: &ToolCall) -> String {
    let Some(tool) = registry.get(&tool_call.name) else {
        warn!(tool = %tool_call.name, "Model requested unknown tool");
        return format!("Error: Unknown tool '{}'", tool_call.name);
    };

    debug!(tool = %tool_call.name, arguments = %tool_call.arguments, "Executing tool");

    match tool.execute(tool_call.arguments.clone()).await {
        Ok(output) if output.is_error => format!("Error: {}", output.content),
        Ok(output) => output.content,
        Err(e) => {
            warn!(tool = %tool_call.name, error = %e, "Tool failed");
            format!("Error executing tool: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, Usage};
    use crate::provider::{CompletionResponse, FinishReason};
    use crate::testing::{MockProvider, MockTool};
    use crate::tool::Tool;

    fn agent(provider: Arc<MockProvider>, tools: Vec<Arc<dyn Tool>>) -> ToolCallingAgent {
        ToolCallingAgent::new(
            provider,
            Arc::new(tools.into_iter().collect()),
            PromptTemplate::default().partial("FORMAT"),
            AgentConfig::default().with_model("mistral-medium-latest"),
        )
    }

    fn tool_call_response(calls: Vec<ToolCall>) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant_with_tool_calls("thinking out loud", calls),
            usage: Usage::default(),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::ToolCalls,
        }
    }

    #[tokio::test]
    async fn test_plain_answer_is_returned_as_string() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("{\"topic\":\"t\"}");

        let output = agent(provider.clone(), vec![]).invoke("aqueducts").await.unwrap();
        assert_eq!(output, Value::String("{\"topic\":\"t\"}".to_string()));

        let request = provider.last_request().unwrap();
        assert_eq!(request.model.as_deref(), Some("mistral-medium-latest"));
        assert_eq!(request.messages[0].content.as_text(), Some(
            "You are a research assistant that will help generate a research paper.\nAnswer the user query and use the necessary tools.\nWrap the output in this format and provide no other text\nFORMAT"
        ));
        assert_eq!(request.messages[1].content.as_text(), Some("aqueducts"));
    }

    #[tokio::test]
    async fn test_chunked_answer_is_enveloped() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_content(Content::Blocks(vec![json!({"type": "text", "text": "X"})]));

        let output = agent(provider, vec![]).invoke("q").await.unwrap();
        assert_eq!(output, json!({"input": "q", "output": [{"type": "text", "text": "X"}]}));
    }

    #[tokio::test]
    async fn test_tool_results_feed_the_scratchpad() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(tool_call_response(vec![ToolCall::new(
            "call-1",
            "wikipedia",
            json!({"query": "Roman aqueduct"}),
        )]));
        provider.queue_response("done");

        let wiki = Arc::new(MockTool::new("wikipedia", "Page: Roman aqueduct"));
        let output = agent(provider.clone(), vec![wiki.clone() as Arc<dyn Tool>]).invoke("aqueducts").await.unwrap();

        assert_eq!(output, json!("done"));
        assert_eq!(wiki.call_count(), 1);
        assert_eq!(provider.request_count(), 2);

        let second = provider.last_request().unwrap();
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.content.as_text(), Some("Page: Roman aqueduct"));
        let call_msg = &second.messages[second.messages.len() - 2];
        assert!(call_msg.content.is_empty());
        assert_eq!(call_msg.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_as_text() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(tool_call_response(vec![ToolCall::new(
            "call-1",
            "calculator",
            json!({}),
        )]));
        provider.queue_response("done");

        agent(provider.clone(), vec![]).invoke("q").await.unwrap();

        let second = provider.last_request().unwrap();
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.content.as_text(), Some("Error: Unknown tool 'calculator'"));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let provider = Arc::new(MockProvider::new());
        for _ in 0..2 {
            provider.queue_raw_response(tool_call_response(vec![ToolCall::new(
                "call",
                "search",
                json!({"query": "q"}),
            )]));
        }
        let search = Arc::new(MockTool::new("search", "results"));
        let mut agent = agent(provider, vec![search as Arc<dyn Tool>]);
        agent.config.max_iterations = 2;

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, Error::MaxIterations(2)));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::rate_limit("busy"));

        let err = agent(provider, vec![]).invoke("q").await.unwrap_err();
        assert!(err.is_rate_limited());
    }
}
