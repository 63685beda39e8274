//! Web search through the DuckDuckGo HTML endpoint.

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ra_core::{Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    /// Maximum number of results returned to the model
    pub max_results: usize,
    pub endpoint: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 5,
            endpoint: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct SearchTool {
    client: Client,
    config: SearchConfig,
}

impl SearchTool {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("research-assistant/", env!("CARGO_PKG_VERSION")))
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web for information"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property("query", PropertySchema::string("The search query"), true),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: SearchArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("search", format!("Invalid arguments: {}", e)))?;

        debug!(query = %args.query, "Searching the web");

        let response = self
            .client
            .post(&self.config.endpoint)
            .form(&[("q", args.query.as_str())])
            .send()
            .await
            .map_err(|e| Error::tool("search", format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::tool("search", format!("HTTP error {}", response.status())));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::tool("search", format!("Failed to read response: {}", e)))?;

        let results = parse_results(&html, self.config.max_results);
        debug!(count = results.len(), "Search complete");

        if results.is_empty() {
            return Ok(ToolOutput::success(format!("No results found for '{}'", args.query)));
        }

        Ok(ToolOutput::success(format_results(&results)))
    }
}

/// Pull result entries out of a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result_sel)
        .filter_map(|result| {
            let link = result.select(&title_sel).next()?;
            let href = link.value().attr("href")?;
            let snippet = result
                .select(&snippet_sel)
                .next()
                .map(|el| clean_text(&element_text(&el)))
                .unwrap_or_default();

            Some(SearchResult {
                title: clean_text(&element_text(&link)),
                url: resolve_url(href),
                snippet,
            })
        })
        .filter(|r| !r.title.is_empty())
        .take(max_results)
        .collect()
}

fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("Title: {}\nURL: {}\nSnippet: {}", r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Result links go through a `/l/?uddg=<target>` redirect; unwrap it.
fn resolve_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    Url::parse(&absolute)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, target)| target.into_owned())
        })
        .unwrap_or(absolute)
}

fn element_text(element: &ElementRef) -> String {
    let mut text = String::new();
    for t in element.text() {
        let trimmed = t.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !text.is_empty() && !text.ends_with(' ') {
            text.push(' ');
        }
        text.push_str(trimmed);
    }
    text
}

/// Collapse runs of whitespace into single spaces.
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
