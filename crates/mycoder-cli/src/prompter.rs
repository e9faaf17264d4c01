//! Terminal side of the `user_prompt` / `user_message` tools.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use mycoder_agent::tools::user::{MessageLevel, PromptRequest, UserPrompter};

/// Asks questions on stdin/stdout with a rustyline editor.
pub struct TerminalPrompter;

#[async_trait]
impl UserPrompter for TerminalPrompter {
    async fn ask(&self, request: &PromptRequest) -> Result<Option<String>> {
        let prompt = prompt_line(request);
        if request.password {
            eprintln!("{}", "(input will be visible)".dimmed());
        }
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let mut editor = DefaultEditor::new()?;
            match editor.readline(&prompt) {
                Ok(line) => Ok(Some(line)),
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    async fn show(&self, content: &str, level: MessageLevel) -> Result<()> {
        let tag = match level {
            MessageLevel::Info => "info".blue().bold(),
            MessageLevel::Warning => "warning".yellow().bold(),
            MessageLevel::Error => "error".red().bold(),
            MessageLevel::Success => "done".green().bold(),
        };
        println!("{tag} {content}");
        Ok(())
    }
}

/// `? message [a/b/c] (default: a): `
fn prompt_line(request: &PromptRequest) -> String {
    let mut line = format!("{} {}", "?".cyan().bold(), request.message.trim());
    if let Some(choices) = &request.choices {
        line.push_str(&format!(" [{}]", choices.join("/")));
    }
    if let Some(default) = &request.default {
        line.push_str(&format!(" (default: {default})"));
    }
    line.push_str(": ");
    line
}
