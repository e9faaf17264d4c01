//! MyCoder CLI: entry point.
//!
//! # Commands
//!
//! - `mycoder run <PROMPT>`: single-shot: run the agent and print its answer
//! - `mycoder chat`: interactive REPL keeping one conversation
//! - `mycoder tools`: list the registered tools
//! - `mycoder config`: print the resolved configuration (keys masked)

mod config_cmd;
mod helpers;
mod prompter;
mod repl;
mod tools_cmd;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mycoder_agent::toolset::build_toolset;
use mycoder_agent::tools::user::UserPrompter;
use mycoder_agent::{AgentError, Conversation, Toolset};
use mycoder_core::config::{load_config, Config};
use mycoder_core::schema::ProviderKind;
use mycoder_providers::{create_provider, LlmProvider};

use crate::prompter::TerminalPrompter;

/// Exit code for a run that hit its turn budget.
const EXIT_BUDGET_EXCEEDED: u8 = 3;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// MyCoder: an AI coding agent for your terminal
#[derive(Parser)]
#[command(name = "mycoder", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// LLM provider (anthropic, openai, ollama)
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    /// Model name (defaults to the provider's default model)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt and print the final answer
    Run {
        /// The task for the agent
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Start an interactive session
    Chat,

    /// List the tools available to the agent
    Tools,

    /// Show the resolved configuration
    Config,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = apply_overrides(load_config(None), cli.provider, cli.model.as_deref());
    init_logging(&config.logging.level, cli.verbose);

    let result = match cli.command {
        Commands::Run { prompt } => run_once(&config, prompt.join(" ")).await,
        Commands::Chat => run_chat(&config).await,
        Commands::Tools => tools_cmd::run(&config).await,
        Commands::Config => config_cmd::run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n{} {e:#}\n", "Error:".red().bold());
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Distinguish a budget overrun from other fatal errors.
fn exit_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<AgentError>() {
        Some(AgentError::BudgetExceeded { .. }) => EXIT_BUDGET_EXCEEDED,
        _ => 1,
    }
}

/// Apply `--provider` / `--model` on top of the loaded config.
///
/// Switching provider without naming a model falls back to that provider's
/// default model.
fn apply_overrides(mut config: Config, provider: Option<ProviderKind>, model: Option<&str>) -> Config {
    if let Some(kind) = provider {
        if kind != config.agent.provider {
            config.agent.provider = kind;
            config.agent.model.clear();
        }
    }
    if let Some(model) = model {
        config.agent.model = model.to_string();
    }
    config
}

// ─────────────────────────────────────────────
// Agent commands
// ─────────────────────────────────────────────

/// Provider plus toolset, ready to drive conversations.
async fn build_session(config: &Config) -> Result<(Arc<dyn LlmProvider>, Toolset)> {
    let provider = create_provider(config).context("failed to create LLM provider")?;
    let prompter: Arc<dyn UserPrompter> = Arc::new(TerminalPrompter);
    let toolset = build_toolset(config, provider.clone(), Some(prompter))
        .await
        .context("failed to register tools")?;
    info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        tools = toolset.tools.len(),
        "session ready"
    );
    Ok((provider, toolset))
}

async fn run_once(config: &Config, prompt: String) -> Result<()> {
    let (provider, toolset) = build_session(config).await?;
    let agent = toolset.agent(provider);
    let mut conversation = Conversation::with_system(toolset.system_prompt());

    let answer = agent.run_prompt(&mut conversation, prompt).await?;
    helpers::print_response(&answer);
    if config.logging.token_usage {
        helpers::print_usage(&conversation.usage(), conversation.turns());
    }
    Ok(())
}

async fn run_chat(config: &Config) -> Result<()> {
    let (provider, toolset) = build_session(config).await?;
    let result = repl::run(provider, &toolset, config.logging.token_usage).await;
    if let Some(subagents) = &toolset.subagents {
        subagents.cancel_all().await;
    }
    result
}

/// Initialize tracing/logging.
///
/// `RUST_LOG` wins; otherwise `--verbose` enables debug output for our
/// crates and `logging.level` applies.
fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mycoder_agent=debug,mycoder_providers=debug,mycoder_core=debug,info")
        } else {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
