use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use ra_core::{
    CompletionRequest, CompletionResponse, Content, Error, FinishReason, Message, Provider, Role,
    ToolCall, ToolDefinition, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_MODEL: &str = "mistral-medium-latest";

pub struct MistralProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: Option<String>,
}

impl MistralProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: Some(DEFAULT_MODEL.to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    fn build_request(&self, request: &CompletionRequest) -> MistralChatRequest {
        // Model priority: request > provider default
        let model = request
            .model
            .clone()
            .or_else(|| self.default_model.clone());

        let messages: Vec<MistralMessage> = request
            .messages
            .iter()
            .map(|m| self.convert_message(m))
            .collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| self.convert_tool(t))
                    .collect(),
            )
        };

        MistralChatRequest {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            extra: request.extra.clone(),
        }
    }

    fn convert_message(&self, message: &Message) -> MistralMessage {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|tc| MistralToolCall {
                        id: tc.id.clone(),
                        r#type: "function".to_string(),
                        function: MistralFunctionCall {
                            name: tc.name.clone(),
                            arguments: Value::String(tc.arguments.to_string()),
                        },
                    })
                    .collect(),
            )
        };

        MistralMessage {
            role: role.to_string(),
            content: Some(Value::String(message.content.to_string_lossy())),
            name: message.name.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }

    fn convert_tool(&self, tool: &ToolDefinition) -> MistralTool {
        MistralTool {
            r#type: "function".to_string(),
            function: MistralFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::to_value(&tool.parameters).unwrap_or_default(),
            },
        }
    }

    fn parse_response(&self, response: MistralChatResponse) -> Result<CompletionResponse, Error> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api(500, "No choices in response"))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(tc.function.arguments)))
            .collect();

        // Chunked content is kept as-is so the caller sees the same shape the API sent.
        let content = match choice.message.content {
            Some(Value::String(text)) => Content::Text(text),
            Some(Value::Array(blocks)) => Content::Blocks(blocks),
            Some(Value::Null) | None => Content::Text(String::new()),
            Some(other) => Content::Text(other.to_string()),
        };

        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_with_tool_calls(content, tool_calls)
        };

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") | Some("model_length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("error") => FinishReason::Error,
            _ => FinishReason::Stop,
        };

        let usage = response.usage.map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(CompletionResponse {
            message,
            usage: usage.unwrap_or_default(),
            model: response.model,
            finish_reason,
        })
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            message: Value,
        }

        #[derive(Deserialize)]
        struct WrappedErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        let message = if let Ok(err) = serde_json::from_str::<WrappedErrorResponse>(body) {
            err.error.message
        } else if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
            match err.message {
                Value::String(s) => s,
                other => other.to_string(),
            }
        } else {
            body.to_string()
        };

        match status {
            401 => Error::auth(message),
            429 => Error::rate_limit(message),
            400 => Error::invalid_request(message),
            _ => Error::api(status, message),
        }
    }
}

/// Tool arguments arrive either as a JSON-encoded string or as an object.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(s) => serde_json::from_str(&s).unwrap_or_default(),
        other => other,
    }
}

#[async_trait]
impl Provider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let api_request = self.build_request(&request);
        debug!(
            model = ?api_request.model,
            messages = api_request.messages.len(),
            "Mistral request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        let api_response: MistralChatResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;

        self.parse_response(api_response)
    }
}

// Mistral API types

#[derive(Debug, Serialize)]
struct MistralChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<MistralMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<MistralTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    /// Extra parameters (safe_prompt, random_seed, etc.)
    #[serde(flatten)]
    extra: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MistralMessage {
    role: String,
    /// A string, or an array of content chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<MistralToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MistralToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: MistralFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct MistralFunctionCall {
    name: String,
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct MistralTool {
    r#type: String,
    function: MistralFunction,
}

#[derive(Debug, Serialize)]
struct MistralFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct MistralChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<MistralChoice>,
    usage: Option<MistralUsage>,
}

#[derive(Debug, Deserialize)]
struct MistralChoice {
    message: MistralMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MistralUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_core::{PropertySchema, ToolParameters};
    use serde_json::json;

    fn parse(provider: &MistralProvider, body: Value) -> CompletionResponse {
        let response: MistralChatResponse = serde_json::from_value(body).unwrap();
        provider.parse_response(response).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = MistralProvider::new("test-key");
        assert_eq!(provider.name(), "mistral");
        assert_eq!(provider.default_model(), Some("mistral-medium-latest"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = MistralProvider::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_build_request() {
        let provider = MistralProvider::new("test-key").with_default_model("mistral-small-latest");
        let tool = ToolDefinition::new("search", "Search the web for information").with_parameters(
            ToolParameters::new().add_property("query", PropertySchema::string("Search query"), true),
        );
        let request = CompletionRequest::new(vec![Message::system("sys"), Message::user("Hello")])
            .with_tools(vec![tool]);
        let api_request = provider.build_request(&request);

        assert_eq!(api_request.model.as_deref(), Some("mistral-small-latest"));
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[1].role, "user");
        assert_eq!(api_request.tool_choice.as_deref(), Some("auto"));

        let body = serde_json::to_value(&api_request).unwrap();
        assert_eq!(body["tools"][0]["function"]["name"], "search");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["query"]));
    }

    #[test]
    fn test_request_model_overrides_default() {
        let provider = MistralProvider::new("k");
        let request = CompletionRequest::new(vec![Message::user("Hi")]).with_model("open-mistral-nemo");
        assert_eq!(provider.build_request(&request).model.as_deref(), Some("open-mistral-nemo"));
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let provider = MistralProvider::new("k");
        let call = ToolCall::new("abc123", "wikipedia", json!({"query": "Aqueduct"}));
        let assistant = provider.convert_message(&Message::assistant_with_tool_calls("", vec![call]));
        let result = provider.convert_message(&Message::tool_result("abc123", "wikipedia", "Page: Aqueduct"));

        let assistant = serde_json::to_value(&assistant).unwrap();
        assert_eq!(assistant["tool_calls"][0]["function"]["arguments"], "{\"query\":\"Aqueduct\"}");

        let result = serde_json::to_value(&result).unwrap();
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "abc123");
        assert_eq!(result["name"], "wikipedia");
    }

    #[test]
    fn test_parse_plain_content() {
        let provider = MistralProvider::new("k");
        let response = parse(
            &provider,
            json!({
                "model": "mistral-medium-latest",
                "choices": [{"message": {"role": "assistant", "content": "{\"topic\":\"x\"}"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }),
        );

        assert_eq!(response.message.content, Content::text("{\"topic\":\"x\"}"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.prompt_tokens, 10);
    }

    #[test]
    fn test_parse_chunked_content() {
        let provider = MistralProvider::new("k");
        let response = parse(
            &provider,
            json!({
                "model": "mistral-medium-latest",
                "choices": [{"message": {"role": "assistant", "content": [{"type": "text", "text": "X"}]}, "finish_reason": "stop"}]
            }),
        );

        assert_eq!(
            response.message.content,
            Content::Blocks(vec![json!({"type": "text", "text": "X"})])
        );
    }

    #[test]
    fn test_parse_tool_calls() {
        let provider = MistralProvider::new("k");
        let response = parse(
            &provider,
            json!({
                "model": "mistral-medium-latest",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [
                            {"id": "a", "function": {"name": "search", "arguments": "{\"query\":\"aqueducts\"}"}},
                            {"id": "b", "function": {"name": "wikipedia", "arguments": {"query": "Aqueduct"}}}
                        ]
                    },
                    "finish_reason": "tool_calls"
                }]
            }),
        );

        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        let calls = &response.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, json!({"query": "aqueducts"}));
        assert_eq!(calls[1].arguments, json!({"query": "Aqueduct"}));
    }

    #[test]
    fn test_parse_no_choices() {
        let provider = MistralProvider::new("k");
        let response: MistralChatResponse =
            serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(provider.parse_response(response).is_err());
    }

    #[test]
    fn test_parse_error_statuses() {
        let provider = MistralProvider::new("k");

        let err = provider.parse_error(429, r#"{"message":"Requests rate limit exceeded"}"#);
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("Requests rate limit exceeded"));

        let err = provider.parse_error(401, r#"{"message":"Unauthorized"}"#);
        assert!(matches!(err, Error::Auth(_)));

        let err = provider.parse_error(400, r#"{"error":{"message":"bad tool schema"}}"#);
        assert_eq!(err.status(), Some(400));

        let err = provider.parse_error(503, "upstream unavailable");
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("upstream unavailable"));
    }
}
