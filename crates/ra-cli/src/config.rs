use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ra_core::{AgentConfig, PipelineConfig, PromptTemplate, DEFAULT_CACHE_CAPACITY, DEFAULT_SYSTEM_TEMPLATE};
use ra_providers::mistral::DEFAULT_MODEL;
use ra_tools::ToolsConfig;

/// Environment variable prefix for overrides, e.g. `RA_CACHE__CAPACITY=0`.
const ENV_PREFIX: &str = "RA_";
const API_KEY_ENV: &str = "MISTRAL_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentSection,
    pub tools: ToolsConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Falls back to MISTRAL_API_KEY
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Extra parameters to pass to the API (e.g., safe_prompt, random_seed)
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            parameters: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// Replaces the built-in system prompt; must contain `{format_instructions}`
    pub system_prompt: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: AgentConfig::default().max_iterations,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Zero disables the result cache
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
        }
    }
}

/// Expand environment variables in a path string
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return PathBuf::from(result);
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.to_string())
}

impl Config {
    /// Load `.env`, then layer defaults, the TOML file and `RA_` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => Self::config_path()?,
        };

        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: Config = figment.extract().context("Invalid configuration")?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }

        if let Some(prompt) = &config.agent.system_prompt {
            PromptTemplate::new(prompt.as_str()).context("Invalid [agent] system_prompt")?;
        }

        let output_file = config.tools.save.output_file.to_string_lossy().to_string();
        config.tools.save.output_file = expand_path(&output_file);

        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("ra"))
    }

    pub fn api_key(&self) -> Result<&str> {
        self.provider.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured. Set {} or add api_key under [provider] in {}",
                API_KEY_ENV,
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".to_string())
            )
        })
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: Some(self.provider.model.clone()),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
            parameters: self.provider.parameters.clone(),
            max_iterations: self.agent.max_iterations,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            system_template: self
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_TEMPLATE.to_string()),
            cache_capacity: self.cache.capacity,
        }
    }

    /// TOML rendering with the API key masked.
    pub fn display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.provider.api_key = shown.provider.api_key.as_deref().map(mask_key);
        toml::to_string_pretty(&shown).context("Failed to render configuration")
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("********{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.model, "mistral-medium-latest");
        assert_eq!(config.agent.max_iterations, 15);
        assert_eq!(config.cache.capacity, 128);
        assert_eq!(config.tools.wikipedia.doc_content_chars_max, 100);
        assert_eq!(config.tools.save.output_file, PathBuf::from("research_output.txt"));
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [provider]
                api_key = "from-file"
                model = "mistral-small-latest"

                [tools.search]
                max_results = 3

                [cache]
                capacity = 10
                "#,
            )?;
            jail.set_env("RA_CACHE__CAPACITY", "0");
            jail.set_env("RA_SERVER__BIND", "0.0.0.0:9000");

            let config = Config::from_figment(Config::figment(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.provider.api_key.as_deref(), Some("from-file"));
            assert_eq!(config.provider.model, "mistral-small-latest");
            assert_eq!(config.tools.search.max_results, 3);
            assert_eq!(config.cache.capacity, 0);
            assert_eq!(config.server.bind, "0.0.0.0:9000");
            assert_eq!(config.tools.wikipedia.top_k_results, 1);
            Ok(())
        });
    }

    #[test]
    fn test_api_key_fallback() {
        Jail::expect_with(|jail| {
            jail.set_env("MISTRAL_API_KEY", "env-key");

            let config = Config::from_figment(Config::figment(Path::new("missing.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.api_key().map_err(|e| e.to_string())?, "env-key");
            Ok(())
        });
    }

    #[test]
    fn test_pipeline_config_uses_prompt_override() {
        let mut config = Config::default();
        config.agent.system_prompt = Some("Be brief. {format_instructions}".to_string());
        config.cache.capacity = 4;

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.system_template, "Be brief. {format_instructions}");
        assert_eq!(pipeline.cache_capacity, 4);
    }

    #[test]
    fn test_rejects_prompt_without_format_instructions() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [agent]
                system_prompt = "You are a research assistant. Answer briefly."
                "#,
            )?;

            let err = Config::from_figment(Config::figment(Path::new("config.toml"))).unwrap_err();
            assert!(format!("{:#}", err).contains("{format_instructions}"));

            jail.set_env("RA_AGENT__SYSTEM_PROMPT", "Be brief. {format_instructions}");
            let config = Config::from_figment(Config::figment(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(
                config.agent.system_prompt.as_deref(),
                Some("Be brief. {format_instructions}")
            );
            Ok(())
        });
    }

    #[test]
    fn test_display_masks_api_key() {
        let mut config = Config::default();
        config.provider.api_key = Some("abcdefghijklmnop".to_string());

        let shown = config.display_toml().unwrap();
        assert!(shown.contains("********mnop"));
        assert!(!shown.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_mask_short_key() {
        assert_eq!(mask_key("abc"), "********");
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("RA_TEST_OUTPUT_DIR", "/tmp/ra");
        assert_eq!(expand_path("$RA_TEST_OUTPUT_DIR/out.txt"), PathBuf::from("/tmp/ra/out.txt"));
        assert_eq!(expand_path("${RA_TEST_OUTPUT_DIR}/out.txt"), PathBuf::from("/tmp/ra/out.txt"));
        assert_eq!(expand_path("plain.txt"), PathBuf::from("plain.txt"));
    }
}
