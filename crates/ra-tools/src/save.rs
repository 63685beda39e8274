//! Append research output to a text file.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use ra_core::{Error, PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters};

pub const DEFAULT_OUTPUT_FILE: &str = "research_output.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub enabled: bool,
    pub output_file: PathBuf,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
        }
    }
}

pub struct SaveTextTool {
    path: PathBuf,
}

impl SaveTextTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
struct SaveArgs {
    data: String,
}

fn format_entry(data: &str, timestamp: &str) -> String {
    format!("--- Research Output ---\nTimestamp: {}\n\n{}\n\n", timestamp, data)
}

#[async_trait]
impl Tool for SaveTextTool {
    fn name(&self) -> &str {
        "save_text_to_file"
    }

    fn description(&self) -> &str {
        "Saves structured research data to a text file."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description()).with_parameters(
            ToolParameters::new().add_property("data", PropertySchema::string("The research text to save"), true),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, Error> {
        let args: SaveArgs = serde_json::from_value(arguments)
            .map_err(|e| Error::tool("save_text_to_file", format!("Invalid arguments: {}", e)))?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let entry = format_entry(&args.data, &timestamp);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::tool("save_text_to_file", format!("Failed to open '{}': {}", self.path.display(), e)))?;

        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| Error::tool("save_text_to_file", format!("Failed to write '{}': {}", self.path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| Error::tool("save_text_to_file", format!("Failed to write '{}': {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), bytes = entry.len(), "Saved research output");
        Ok(ToolOutput::success(format!("Data successfully saved to {}", self.path.display())))
    }
}
