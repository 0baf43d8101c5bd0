//! AI Insights CLI - Workspace Chat in the Terminal
//!
//! Streams answers from the AI Insights API as they are generated.
//!
//! # Usage
//!
//! ```bash
//! # Ask one question
//! ai-insights chat --workspace ws-42 "What changed in the Q3 risk register?"
//!
//! # Interactive conversation (/history, /clear, /quit)
//! ai-insights chat --workspace ws-42
//!
//! # Ask about an image
//! ai-insights chat -w ws-42 --image chart.png "Summarize this chart"
//!
//! # Run a report template
//! ai-insights template -w ws-42 -t risk-summary --context quarter=Q3
//!
//! # Check the API is reachable
//! ai-insights --api-url http://localhost:8000 health
//!
//! # Verbose logging
//! RUST_LOG=debug ai-insights chat -w ws-42
//! ```
//!
//! # Signals
//!
//! - `SIGINT` while an answer streams: cancel it, keeping the partial answer
//! - `SIGINT` at the prompt: exit

mod chat;
mod render;
mod template;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insights_core::{
    default_config_path, load_config_from_path, ApiClient, ClientConfig, ConfigOverrides,
};
use tokio::io::AsyncWriteExt;
use tracing::info;

use chat::ChatArgs;
use template::TemplateArgs;

/// AI Insights - ask questions about your workspace documents
#[derive(Parser, Debug)]
#[command(name = "ai-insights")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "AI_INSIGHTS_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// API base URL (overrides config and environment)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Model to answer with (overrides config and environment)
    #[arg(short = 'm', long, value_name = "MODEL", global = true)]
    model: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short = 'l',
        long,
        env = "AI_INSIGHTS_LOG_LEVEL",
        default_value = "warn",
        global = true
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask questions about a workspace
    Chat(ChatArgs),
    /// Run a report template
    Template(TemplateArgs),
    /// Check that the API answers
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let config = resolve_config(&args)?;
    info!(
        base_url = %config.base_url,
        source = %config.base_url_source(),
        model = %config.default_model,
        "Using AI Insights API"
    );

    let client = Arc::new(ApiClient::new(&config));

    match args.command {
        Command::Chat(chat_args) => chat::run(client, &config, chat_args).await,
        Command::Template(template_args) => template::run(client, &config, template_args).await,
        Command::Health => health(&client).await,
    }
}

/// Initialize logging; output goes to stderr so answers stay pipeable
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("insights_cli={level},insights_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Ok(())
}

/// Load the config file and environment, then apply command-line overrides
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &args.api_url {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(model) = &args.model {
        overrides = overrides.with_default_model(model.clone());
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn health(client: &ApiClient) -> Result<()> {
    client
        .health_check()
        .await
        .with_context(|| format!("AI Insights API at {} is not reachable", client.base_url()))?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("AI Insights API at {} is reachable\n", client.base_url()).as_bytes())
        .await?;
    stdout.flush().await?;
    Ok(())
}
