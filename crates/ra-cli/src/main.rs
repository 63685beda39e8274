use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ra_core::{ResearchPipeline, ResearchQuery, ToolRegistry};
use ra_providers::MistralProvider;
use ra_tools::create_research_tools;

mod config;
mod render;
mod server;
mod setup;

use config::Config;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: all tracing including HTTP internals
    Trace,
    /// Verbose: requests, tool execution details, cache hits
    Debug,
    /// Standard: query start and finish
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "ra")]
#[command(author, version, about = "Research assistant: ask a question, get a sourced summary", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/ra/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs to file (JSON-lines format)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a single query and print the result
    Ask {
        /// Research query (prompted for when omitted)
        query: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the research web form
    Serve {
        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Show current configuration
    Config,
    /// Initialize configuration file in ~/.config/ra
    Setup,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Resolve log level: --debug overrides --log-level
    let log_level = if cli.debug {
        LogLevel::Debug
    } else {
        cli.log_level
    };

    let filter = EnvFilter::new(log_level.as_filter());

    if let Some(log_path) = &cli.log_file {
        // Log file specified: write JSON to file
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Handle setup before config is required
    if matches!(&cli.command, Some(Commands::Setup)) {
        setup::run()?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }

    match cli.command {
        Some(Commands::Config) => {
            show_config(&config, cli.config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Serve { bind }) => {
            let pipeline = build_pipeline(&config)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            server::serve(pipeline, &bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Ask { query, json }) => ask_mode(&config, query, json).await,
        Some(Commands::Setup) => Ok(ExitCode::SUCCESS),
        None => ask_mode(&config, None, false).await,
    }
}

/// Wire provider, tools and agent into a shared pipeline.
fn build_pipeline(config: &Config) -> Result<Arc<ResearchPipeline>> {
    let mut provider = MistralProvider::new(config.api_key()?).with_default_model(&config.provider.model);
    if let Some(url) = &config.provider.base_url {
        provider = provider.with_base_url(url);
    }

    let tools: ToolRegistry = create_research_tools(&config.tools).into_iter().collect();
    info!(
        model = %config.provider.model,
        tools = ?tools.names(),
        cache_capacity = config.cache.capacity,
        "Research pipeline ready"
    );

    Ok(Arc::new(ResearchPipeline::with_agent(
        Arc::new(provider),
        Arc::new(tools),
        config.agent_config(),
        &config.pipeline_config(),
    )?))
}

async fn ask_mode(config: &Config, query: Option<String>, json: bool) -> Result<ExitCode> {
    let query = match query {
        Some(q) => q,
        None => read_query()?,
    };

    // Blank input is reported before a missing API key can be.
    let query = match ResearchQuery::new(query) {
        Ok(query) => query,
        Err(e) => {
            eprintln!("{}", render::format_error(&e));
            return Ok(ExitCode::FAILURE);
        }
    };

    let pipeline = build_pipeline(config)?;
    match pipeline.run_query(query.as_str()).await {
        Ok(response) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", render::format_response(&response));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", render::format_error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn read_query() -> Result<String> {
    print!("{}", render::QUERY_PROMPT);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read query from stdin")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn show_config(config: &Config, path: Option<&std::path::Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("# Config file: {}", path.display());
    println!();
    print!("{}", config.display_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ask() {
        let cli = Cli::try_parse_from(["ra", "ask", "Roman aqueducts", "--json", "-m", "mistral-small-latest"]).unwrap();
        assert_eq!(cli.model.as_deref(), Some("mistral-small-latest"));
        match cli.command {
            Some(Commands::Ask { query, json }) => {
                assert_eq!(query.as_deref(), Some("Roman aqueducts"));
                assert!(json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["ra", "--debug", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Some(Commands::Serve { bind: Some(ref b) }) if b == "0.0.0.0:8080"));
    }

    #[test]
    fn test_build_pipeline_requires_api_key() {
        let config = Config::default();
        assert!(build_pipeline(&config).is_err());
    }

    #[tokio::test]
    async fn test_ask_blank_query_without_api_key() {
        let config = Config::default();
        let code = ask_mode(&config, Some("   ".to_string()), false).await.unwrap();
        assert_eq!(code, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_ask_missing_api_key_is_an_error() {
        let config = Config::default();
        let err = ask_mode(&config, Some("Roman aqueducts".to_string()), false).await.unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn test_build_pipeline_rejects_prompt_without_placeholder() {
        let mut config = Config::default();
        config.provider.api_key = Some("test-key".to_string());
        config.agent.system_prompt = Some("Answer the query.".to_string());
        assert!(build_pipeline(&config).is_err());
    }

    #[test]
    fn test_build_pipeline() {
        let mut config = Config::default();
        config.provider.api_key = Some("test-key".to_string());
        let pipeline = build_pipeline(&config).unwrap();
        assert!(pipeline.cache().is_empty());
    }
}
