//! Normalization of raw agent output into canonical text.
//!
//! An agent executor answers with untyped JSON in one of two shapes:
//!
//! - a plain string holding the final answer, or
//! - an envelope `{"output": [{"text": "..."}, ...]}` whose first content
//!   block carries the answer.
//!
//! [`RawAgentOutput`] models exactly those two shapes. Anything else is an
//! [`ExtractionError`], never a panic.

use serde_json::{Map, Value};
use thiserror::Error;

/// Key of the content-block sequence inside an output envelope.
pub const OUTPUT_KEY: &str = "output";

/// Key of the text payload inside a content block.
pub const TEXT_KEY: &str = "text";

/// A content block: a text payload plus whatever metadata the model attached.
pub type ContentBlock = Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RawAgentOutput {
    PlainText(String),
    Enveloped(Vec<ContentBlock>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unexpected agent output structure: {shape}")]
    UnexpectedShape { shape: String },

    #[error("agent output envelope has no content blocks")]
    EmptyEnvelope,

    #[error("first content block has no text field: {shape}")]
    MalformedBlock { shape: String },
}

impl ExtractionError {
    /// Description of the structure that could not be handled.
    pub fn shape(&self) -> String {
        match self {
            ExtractionError::UnexpectedShape { shape } => shape.clone(),
            ExtractionError::EmptyEnvelope => "envelope with an empty `output` sequence".to_string(),
            ExtractionError::MalformedBlock { shape } => format!("envelope whose first block is {shape}"),
        }
    }
}

impl TryFrom<Value> for RawAgentOutput {
    type Error = ExtractionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(mut map) => match map.remove(OUTPUT_KEY) {
                Some(Value::Array(blocks)) => Ok(RawAgentOutput::Enveloped(blocks)),
                Some(other) => Err(ExtractionError::UnexpectedShape {
                    shape: format!("object with non-array `{OUTPUT_KEY}` ({})", describe(&other)),
                }),
                None => Err(ExtractionError::UnexpectedShape {
                    shape: describe_object(&map),
                }),
            },
            Value::String(text) => Ok(RawAgentOutput::PlainText(text)),
            other => Err(ExtractionError::UnexpectedShape {
                shape: describe(&other),
            }),
        }
    }
}

impl RawAgentOutput {
    /// The single text string the response schema is parsed from.
    pub fn canonical_text(&self) -> Result<&str, ExtractionError> {
        match self {
            RawAgentOutput::PlainText(text) => Ok(text),
            RawAgentOutput::Enveloped(blocks) => {
                let first = blocks.first().ok_or(ExtractionError::EmptyEnvelope)?;
                first
                    .get(TEXT_KEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| ExtractionError::MalformedBlock {
                        shape: describe(first),
                    })
            }
        }
    }
}

/// Classify and extract in one step.
pub fn extract_text(raw: Value) -> Result<String, ExtractionError> {
    let output = RawAgentOutput::try_from(raw)?;
    output.canonical_text().map(str::to_string)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(map) => describe_object(map),
    }
}

fn describe_object(map: &Map<String, Value>) -> String {
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    format!("object with keys [{}]", keys.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_yields_first_block_text() {
        assert_eq!(extract_text(json!({"output": [{"text": "X"}]})), Ok("X".to_string()));
    }

    #[test]
    fn test_plain_string_passes_through() {
        assert_eq!(extract_text(json!("X")), Ok("X".to_string()));
    }

    #[test]
    fn test_only_first_block_is_used() {
        let raw = json!({
            "input": "aqueducts",
            "output": [
                {"type": "text", "text": "first", "index": 0},
                {"type": "text", "text": "second", "index": 1}
            ]
        });
        assert_eq!(extract_text(raw), Ok("first".to_string()));
    }

    #[test]
    fn test_empty_envelope() {
        assert_eq!(extract_text(json!({"output": []})), Err(ExtractionError::EmptyEnvelope));
    }

    #[test]
    fn test_missing_output_key() {
        let err = extract_text(json!({"foo": 1})).unwrap_err();
        assert_eq!(
            err,
            ExtractionError::UnexpectedShape {
                shape: "object with keys [foo]".to_string()
            }
        );
    }

    #[test]
    fn test_output_not_a_sequence() {
        let err = extract_text(json!({"output": "X"})).unwrap_err();
        assert!(err.shape().contains("non-array"));
    }

    #[test]
    fn test_block_without_text() {
        let err = extract_text(json!({"output": [{"type": "image_url"}]})).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedBlock { .. }));

        let err = extract_text(json!({"output": ["bare string"]})).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedBlock { .. }));

        let err = extract_text(json!({"output": [{"text": 42}]})).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedBlock { .. }));
    }

    #[test]
    fn test_scalar_shapes_rejected() {
        for raw in [json!(null), json!(7), json!(true), json!([{"text": "X"}])] {
            assert!(matches!(
                RawAgentOutput::try_from(raw),
                Err(ExtractionError::UnexpectedShape { .. })
            ));
        }
    }

    #[test]
    fn test_extraction_is_pure() {
        let output = RawAgentOutput::try_from(json!({"output": [{"text": "same"}]})).unwrap();
        let first = output.canonical_text().unwrap().to_string();
        let second = output.canonical_text().unwrap().to_string();
        assert_eq!(first, second);
    }
}
