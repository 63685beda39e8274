//! ra-tools: Research tools for research-assistant
//!
//! This crate provides the tools available to the research agent:
//! - Search: web search results with title, URL and snippet
//! - Wikipedia: short encyclopedia summaries
//! - Save: append research output to a text file

pub mod save;
pub mod search;
pub mod wikipedia;

use std::sync::Arc;

use ra_core::Tool;
use serde::{Deserialize, Serialize};

pub use save::{SaveConfig, SaveTextTool};
pub use search::{SearchConfig, SearchResult, SearchTool};
pub use wikipedia::{WikipediaConfig, WikipediaTool};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub search: SearchConfig,
    pub wikipedia: WikipediaConfig,
    pub save: SaveConfig,
}

/// Create every enabled research tool.
pub fn create_research_tools(config: &ToolsConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    if config.search.enabled {
        tools.push(Arc::new(SearchTool::new(config.search.clone())));
    }
    if config.wikipedia.enabled {
        tools.push(Arc::new(WikipediaTool::new(config.wikipedia.clone())));
    }
    if config.save.enabled {
        tools.push(Arc::new(SaveTextTool::new(config.save.output_file.clone())));
    }

    tools
}
