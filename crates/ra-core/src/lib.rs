//! ra-core: Core types and the research pipeline for research-assistant
//!
//! This crate provides the provider and tool abstractions, the tool-calling
//! agent, and the pipeline that turns a query into a validated
//! [`ResearchResponse`].

pub mod agent;
pub mod cache;
pub mod error;
pub mod message;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{AgentConfig, AgentExecutor, ToolCallingAgent};
pub use cache::{ResultCache, DEFAULT_CACHE_CAPACITY};
pub use error::Error;
pub use message::{Content, Message, Role, ToolCall, Usage};
pub use output::{extract_text, ExtractionError, RawAgentOutput};
pub use pipeline::{ClassifiedError, PipelineConfig, ResearchPipeline, ResearchQuery};
pub use prompt::{PromptTemplate, DEFAULT_SYSTEM_TEMPLATE};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use schema::{ResearchResponse, ResponseSchema, SchemaError};
pub use tool::{PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, ToolRegistry};

pub type Result<T> = std::result::Result<T, Error>;
