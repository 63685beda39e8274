//! The typed contract for a finished research answer.
//!
//! [`ResponseSchema`] produces the format instructions that are embedded in
//! the agent prompt and parses the agent's canonical text back into a
//! [`ResearchResponse`].

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validated research answer. All four fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchResponse {
    /// The subject that was researched.
    pub topic: String,
    /// A prose summary of the findings.
    pub summary: String,
    /// URLs or citations backing the summary, in presentation order.
    pub sources: Vec<String>,
    /// Names of the tools used while researching.
    pub tools_used: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("model output does not match the response schema: {0}")]
    Invalid(String),
}

const FORMAT_INSTRUCTIONS: &str = r#"The output should be formatted as a JSON instance that conforms to the JSON schema below.

As an example, for the schema {"properties": {"foo": {"description": "a list of strings", "type": "array", "items": {"type": "string"}}}, "required": ["foo"]}
the object {"foo": ["bar", "baz"]} is a well-formatted instance of the schema. The object {"properties": {"foo": ["bar", "baz"]}} is not well-formatted.

Here is the output schema:
```
{schema}
```"#;

/// Format instructions and parsing for [`ResearchResponse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseSchema;

impl ResponseSchema {
    /// JSON schema of [`ResearchResponse`] without the `title` and `$schema`
    /// keys, which only add noise for the model.
    pub fn json_schema() -> serde_json::Value {
        let mut schema = schema_for!(ResearchResponse).to_value();
        if let Some(obj) = schema.as_object_mut() {
            obj.remove("title");
            obj.remove("$schema");
        }
        schema
    }

    pub fn format_instructions(&self) -> String {
        FORMAT_INSTRUCTIONS.replace("{schema}", &Self::json_schema().to_string())
    }

    pub fn parse(&self, text: &str) -> Result<ResearchResponse, SchemaError> {
        let candidate = json_candidate(text).ok_or(SchemaError::NoJson)?;
        serde_json::from_str(candidate).map_err(|e| SchemaError::Invalid(e.to_string()))
    }

    pub fn serialize(&self, response: &ResearchResponse) -> String {
        // Serializing plain strings and string lists cannot fail.
        serde_json::to_string(response).unwrap_or_default()
    }
}

/// Locate the JSON payload inside model text.
///
/// Order: the body of the first fenced code block, the text itself when it
/// is a JSON object, then the span from the first `{` to the last `}`.
fn json_candidate(text: &str) -> Option<&str> {
    let text = text.trim();

    if let Some(body) = fenced_body(text) {
        return Some(body);
    }

    if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(text).is_ok() {
        return Some(text);
    }

    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        // Unterminated object: hand it to the decoder for a precise error.
        _ => text.starts_with('{').then_some(text),
    }
}

fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip the info string (e.g. `json`), which may share a line with the body.
    let info_len = after
        .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
        .unwrap_or(after.len());
    let body = &after[info_len..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}
