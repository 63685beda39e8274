//! The research pipeline: query validation, one agent invocation, output
//! extraction and schema parsing, with every failure classified.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::agent::{AgentConfig, AgentExecutor, ToolCallingAgent};
use crate::cache::{ResultCache, DEFAULT_CACHE_CAPACITY};
use crate::error::Error;
use crate::output::extract_text;
use crate::prompt::{PromptTemplate, DEFAULT_SYSTEM_TEMPLATE};
use crate::provider::Provider;
use crate::schema::{ResearchResponse, ResponseSchema};
use crate::tool::ToolRegistry;

pub const RATE_LIMIT_MESSAGE: &str = "API limit reached or model is busy. Please try again later.";

/// A non-blank research query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResearchQuery(String);

impl ResearchQuery {
    pub fn new(text: impl Into<String>) -> Result<Self, ClassifiedError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ClassifiedError::EmptyQuery);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every way a research request can fail, as shown to the user.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    #[error("Please enter a query to start research.")]
    EmptyQuery,

    #[error("API limit reached or model is busy. Please try again later.")]
    RateLimited { message: String },

    #[error("API Error: {message}")]
    ApiError { message: String },

    #[error("Unexpected agent output structure: {shape}")]
    UnexpectedOutputShape { shape: String },

    #[error("Error parsing response: {message}")]
    SchemaValidation { message: String, raw: String },
}

impl ClassifiedError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedError::EmptyQuery => "empty_query",
            ClassifiedError::RateLimited { .. } => "rate_limited",
            ClassifiedError::ApiError { .. } => "api_error",
            ClassifiedError::UnexpectedOutputShape { .. } => "unexpected_output_shape",
            ClassifiedError::SchemaValidation { .. } => "schema_validation",
        }
    }

    /// The text the model produced, when parsing it is what failed.
    pub fn raw(&self) -> Option<&str> {
        match self {
            ClassifiedError::SchemaValidation { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Classify an executor failure: HTTP 429 is a rate limit, anything else
    /// is a generic API error.
    pub fn from_executor(err: Error) -> Self {
        if err.is_rate_limited() {
            ClassifiedError::RateLimited {
                message: err.to_string(),
            }
        } else {
            ClassifiedError::ApiError {
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// System prompt template; must contain `{format_instructions}`.
    pub system_template: String,
    /// Result cache capacity; zero disables caching.
    pub cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

pub struct ResearchPipeline {
    executor: Arc<dyn AgentExecutor>,
    schema: ResponseSchema,
    cache: ResultCache,
}

impl ResearchPipeline {
    pub fn new(executor: Arc<dyn AgentExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            schema: ResponseSchema,
            cache: ResultCache::new(config.cache_capacity),
        }
    }

    /// Wire a tool-calling agent whose prompt carries the response schema's
    /// format instructions.
    pub fn with_agent(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        agent_config: AgentConfig,
        config: &PipelineConfig,
    ) -> crate::Result<Self> {
        let prompt = PromptTemplate::new(config.system_template.as_str())?
            .partial(&ResponseSchema.format_instructions());
        let agent = ToolCallingAgent::new(provider, tools, prompt, agent_config);
        Ok(Self::new(Arc::new(agent), config))
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Run one research request. Exactly one agent invocation is attempted
    /// unless the query is blank or already cached.
    #[instrument(skip(self))]
    pub async fn run_query(&self, query: &str) -> Result<ResearchResponse, ClassifiedError> {
        let query = ResearchQuery::new(query)?;

        if let Some(cached) = self.cache.get(query.as_str()) {
            debug!("Serving research result from cache");
            return Ok(cached);
        }

        info!("Invoking research agent");
        let raw = self.executor.invoke(query.as_str()).await.map_err(|e| {
            let classified = ClassifiedError::from_executor(e);
            warn!(kind = classified.kind(), error = %classified, "Agent invocation failed");
            classified
        })?;

        let text = extract_text(raw).map_err(|e| {
            warn!(error = %e, "Could not extract text from agent output");
            ClassifiedError::UnexpectedOutputShape { shape: e.shape() }
        })?;
        debug!(text_len = text.len(), "Extracted canonical text");

        let response = self.schema.parse(&text).map_err(|e| {
            warn!(error = %e, "Agent output failed schema validation");
            ClassifiedError::SchemaValidation {
                message: e.to_string(),
                raw: text.clone(),
            }
        })?;

        info!(
            topic = %response.topic,
            sources = response.sources.len(),
            tools_used = ?response.tools_used,
            "Research complete"
        );
        self.cache.insert(query.as_str(), response.clone());
        debug!(cached = self.cache.len(), "Stored research result");
        Ok(response)
    }
}
