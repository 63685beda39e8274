//! Encyclopedia lookup through the MediaWiki API.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ra_core::{Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const NO_RESULT: &str = "No good Wikipedia Search Result was found";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaConfig {
    pub enabled: bool,
    /// Number of top search hits to summarize
    pub top_k_results: usize,
    /// Maximum characters of the combined summary text
    pub doc_content_chars_max: usize,
    pub api_url: String,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k_results: 1,
            doc_content_chars_max: 100,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

pub struct WikipediaTool {
    client: Client,
    config: WikipediaConfig,
}

impl WikipediaTool {
    pub fn new(config: WikipediaConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("research-assistant/", env!("CARGO_PKG_VERSION")))
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<String>, Error> {
        let limit = self.config.top_k_results.to_string();
        let response: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .await?;

        Ok(response.query.search.into_iter().map(|hit| hit.title).collect())
    }

    async fn page_summary(&self, title: &str) -> Result<Option<Page>, Error> {
        let response: ExtractResponse = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
            ])
            .await?;

        Ok(response
            .query
            .pages
            .into_values()
            .find(|page| page.extract.as_deref().is_some_and(|e| !e.is_empty())))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, Error> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| Error::tool("wikipedia", format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::tool("wikipedia", format!("HTTP error {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|e| Error::tool("wikipedia", format!("Failed to parse response: {}", e)))
    }
}

#[derive(Deserialize)]
struct WikipediaArgs {
    query: String,
}

#[derive(Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    query: SearchQuery,
}

#[derive(Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize, Default)]
struct ExtractResponse {
    #[serde(default)]
    query: ExtractQuery,
}

#[derive(Deserialize, Default)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Clone, Deserialize)]
struct Page {
    title: String,
    extract: Option<String>,
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Look up a topic on Wikipedia and return a short summary"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property("query", PropertySchema::string("Topic to look up"), true),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: WikipediaArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("wikipedia", format!("Invalid arguments: {}", e)))?;

        let titles = self.search_titles(&args.query).await?;
        debug!(query = %args.query, hits = titles.len(), "Wikipedia search");

        let mut pages = Vec::new();
        for title in titles.iter().take(self.config.top_k_results) {
            if let Some(page) = self.page_summary(title).await? {
                pages.push(page);
            }
        }

        Ok(ToolOutput::success(format_pages(&pages, self.config.doc_content_chars_max)))
    }
}

/// Render pages as `Page:`/`Summary:` paragraphs, truncated as a whole.
fn format_pages(pages: &[Page], max_chars: usize) -> String {
    let summaries: Vec<String> = pages
        .iter()
        .filter_map(|page| {
            page.extract
                .as_deref()
                .map(|extract| format!("Page: {}\nSummary: {}", page.title, extract))
        })
        .collect();

    if summaries.is_empty() {
        return NO_RESULT.to_string();
    }

    summaries.join("\n\n").chars().take(max_chars).collect()
}
