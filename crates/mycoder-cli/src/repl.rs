//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history. One
//! [`Conversation`] lives for the whole session; Ctrl-C while the agent is
//! working cancels that run without leaving the REPL.

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use mycoder_agent::{AgentError, CancelToken, Conversation, Toolset};
use mycoder_providers::LlmProvider;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// What a line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    Clear,
    Usage,
    Prompt(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let lower = trimmed.to_lowercase();
    if EXIT_COMMANDS.contains(&lower.as_str()) {
        return Input::Exit;
    }
    match lower.as_str() {
        "/clear" => Input::Clear,
        "/usage" => Input::Usage,
        _ => Input::Prompt(trimmed),
    }
}

/// Run the interactive REPL loop.
pub async fn run(provider: Arc<dyn LlmProvider>, toolset: &Toolset, show_usage: bool) -> Result<()> {
    helpers::print_banner(provider.provider_name(), provider.model_name());

    let mut editor = create_editor()?;
    let mut conversation = Conversation::with_system(toolset.system_prompt());

    loop {
        let line = match editor.readline("You: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let prompt = match classify(&line) {
            Input::Empty => continue,
            Input::Exit => {
                println!("\nGoodbye!");
                break;
            }
            Input::Clear => {
                conversation = Conversation::with_system(toolset.system_prompt());
                println!("{}", "Started a new conversation.".dimmed());
                continue;
            }
            Input::Usage => {
                helpers::print_usage(&conversation.usage(), conversation.turns());
                continue;
            }
            Input::Prompt(prompt) => prompt.to_string(),
        };
        let _ = editor.add_history_entry(line.as_str());

        debug!(input_len = prompt.len(), "processing input");
        let token = CancelToken::new();
        let agent = toolset.agent(provider.clone()).with_cancel_token(token.clone());
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let outcome = agent.run_prompt(&mut conversation, prompt).await;
        interrupt.abort();

        match outcome {
            Ok(answer) => {
                helpers::print_response(&answer);
                if show_usage {
                    helpers::print_usage(&conversation.usage(), conversation.turns());
                }
            }
            Err(AgentError::Cancelled) => println!("\n{}\n", "Cancelled.".yellow()),
            Err(e) => eprintln!("\n{} {e}\n", "Error:".red().bold()),
        }
    }

    save_history(&mut editor);
    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    mycoder_core::utils::get_data_path().join("history").join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
