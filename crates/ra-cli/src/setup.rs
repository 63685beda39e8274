use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# research-assistant configuration
#
# The API key is read from MISTRAL_API_KEY by default (a .env file works too).
# Any value below can be overridden with RA_<SECTION>__<KEY>, e.g.
#   RA_CACHE__CAPACITY=0

# ── Provider ─────────────────────────────────────────────────────

[provider]
# api_key = "..."                 # or set MISTRAL_API_KEY env var
model = "mistral-medium-latest"
# base_url = "https://api.mistral.ai/v1"
# temperature = 0.3
# max_tokens = 2048

# [provider.parameters]
# safe_prompt = true

# ── Agent ────────────────────────────────────────────────────────

[agent]
max_iterations = 15
# system_prompt = """
# You are a research assistant that will help generate a research paper.
# Answer the user query and use the necessary tools.
# Wrap the output in this format and provide no other text
# {format_instructions}"""

# ── Tools ────────────────────────────────────────────────────────

[tools.search]
enabled = true
max_results = 5

[tools.wikipedia]
enabled = true
top_k_results = 1
doc_content_chars_max = 100

[tools.save]
enabled = true
output_file = "research_output.txt"

# ── Cache ────────────────────────────────────────────────────────
# Successful results are kept in memory for the life of the process.
# Set capacity = 0 to disable.

[cache]
capacity = 128

# ── Web form (ra serve) ──────────────────────────────────────────

[server]
bind = "127.0.0.1:8501"
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (Existing file will be backed up) [y/N] ");

        // Flush stdout so the prompt appears before reading
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        let backup = backup_file(&config_path)?;
        println!("  Backed up to {}", backup.display());
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your API key:  export MISTRAL_API_KEY=\"...\"");
    println!("  2. Ask a question:    ra ask \"history of the Roman aqueducts\"");
    println!("  3. Or open the form:  ra serve");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE).with_context(|| format!("Failed to write {}", path.display()))
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = format!("toml.bak.{}", timestamp);
        backup = path.with_extension(name);
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;

    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::{Format, Serialized, Toml};
    use figment::Figment;
    use tempfile::TempDir;

    #[test]
    fn test_template_parses_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        write_template(&path).unwrap();

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        let defaults = Config::default();

        assert_eq!(config.provider.model, defaults.provider.model);
        assert_eq!(config.agent.max_iterations, defaults.agent.max_iterations);
        assert_eq!(config.cache.capacity, defaults.cache.capacity);
        assert_eq!(config.server.bind, defaults.server.bind);
        assert_eq!(config.tools.search.max_results, defaults.tools.search.max_results);
        assert_eq!(config.tools.save.output_file, defaults.tools.save.output_file);
    }

    #[test]
    fn test_backup_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "first").unwrap();
        let first = backup_file(&path).unwrap();
        assert_eq!(first, dir.path().join("config.toml.bak"));
        assert!(!path.exists());

        std::fs::write(&path, "second").unwrap();
        let second = backup_file(&path).unwrap();
        assert_ne!(second, first);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "second");
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "first");
    }
}
