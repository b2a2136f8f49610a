//! # skillet-cli
//!
//! Command-line interface for Skillet.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use skillet_agent::Orchestrator;
use skillet_core::Config;
use skillet_llm::{LlmClient, OpenAiCompatClient};
use skillet_mcp::{load_server_configs, McpClientManager};
use skillet_skills::{builtin, SkillRegistry};

mod commands;
mod output;
mod repl;

/// Skillet - skill-routing agent over MCP tool servers
#[derive(Parser)]
#[command(name = "skillet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Initial prompt to send (starts interactive mode after)
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// Print mode - execute prompt and exit (non-interactive)
    #[arg(short, long)]
    print: bool,

    /// Show the plan and run timeline after each reply
    #[arg(long)]
    debug: bool,

    /// Load configuration from a specific file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// MCP server management
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },
    /// List registered skills
    Skills,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum McpAction {
    /// List configured MCP servers and their connection state
    List,
    /// List every tool the connected servers expose
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path, e))?,
        None => Config::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    // Assemble the pipeline; nothing connects until `initialize`
    let orchestrator = build_orchestrator(config)?;

    // Handle subcommands
    match cli.command {
        Some(Commands::Mcp { action }) => {
            commands::mcp::handle(action, &orchestrator).await?;
        }
        Some(Commands::Skills) => {
            commands::skills::handle(&orchestrator).await?;
        }
        Some(Commands::Version) => {
            println!("skillet {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            // Interactive mode
            if cli.print {
                // Print mode - single response then exit
                if let Some(ref prompt) = cli.prompt {
                    commands::print::run(prompt, &cli, &orchestrator).await?;
                } else {
                    anyhow::bail!("Print mode requires a prompt");
                }
            } else {
                // Interactive REPL mode
                repl::run(cli, orchestrator).await?;
            }
        }
    }

    Ok(())
}

/// Build the orchestrator from configuration: LLM client, MCP manager
/// and the standard skill set.
fn build_orchestrator(config: Config) -> anyhow::Result<Orchestrator> {
    let llm = Arc::new(OpenAiCompatClient::from_config(&config.llm)?) as Arc<dyn LlmClient>;

    let servers = load_server_configs(&config.servers_file)?;
    let manager = Arc::new(McpClientManager::new(servers));

    let skills = Arc::new(
        SkillRegistry::builder()
            .register_all(builtin::standard())
            .build()?,
    );

    let orchestrator = Orchestrator::builder()
        .config(config)
        .llm(llm)
        .manager(manager)
        .skills(skills)
        .build()?;

    Ok(orchestrator)
}
