//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentExecutor;
use crate::error::Error;
use crate::message::{Content, Message, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::tool::{PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub default_model: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            default_model: None,
        }
    }

    /// Queue a plain-text response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.queue_content(Content::text(content));
    }

    /// Queue a response with arbitrary content (e.g. chunked blocks).
    pub fn queue_content(&self, content: Content) {
        self.queue_raw_response(CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        });
    }

    /// Queue a raw CompletionResponse.
    pub fn queue_raw_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().insert(0, Ok(response));
    }

    /// Queue an error for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(Error::Unknown("No mock response queued".to_string())))
    }
}

/// A mock executor that returns queued raw outputs and counts invocations.
pub struct MockExecutor {
    outputs: Mutex<Vec<Result<Value, Error>>>,
    pub queries: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            outputs: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue a raw output (FIFO).
    pub fn queue_output(&self, output: Value) {
        self.outputs.lock().unwrap().insert(0, Ok(output));
    }

    /// Queue an executor failure (FIFO).
    pub fn queue_error(&self, error: Error) {
        self.outputs.lock().unwrap().insert(0, Err(error));
    }

    pub fn invocation_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentExecutor for MockExecutor {
    async fn invoke(&self, query: &str) -> Result<Value, Error> {
        self.queries.lock().unwrap().push(query.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(Error::Unknown("No mock output queued".to_string())))
    }
}

/// A tool that returns a fixed reply and records its arguments.
pub struct MockTool {
    name: String,
    reply: String,
    pub calls: Mutex<Vec<Value>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock tool"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property("query", PropertySchema::string("Input text"), true),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, Error> {
        self.calls.lock().unwrap().push(arguments);
        Ok(ToolOutput::success(self.reply.as_str()))
    }
}
