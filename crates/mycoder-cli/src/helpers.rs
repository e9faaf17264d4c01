//! Shared CLI helpers: response printing, banner, secret masking.

use std::path::Path;

use colored::Colorize;
use serde_json::Value;

use mycoder_core::types::Usage;
use mycoder_core::utils::mask_secret;

/// Object keys whose values are secrets.
const SECRET_KEYS: &[&str] = &["apiKey", "token", "password"];

/// Print an agent response to stdout.
pub fn print_response(response: &str) {
    println!();
    println!("{}", "MyCoder".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// Print accumulated token usage.
pub fn print_usage(usage: &Usage, turns: usize) {
    println!(
        "{}",
        format!(
            "tokens: {} in / {} out ({} total) over {turns} turn{}",
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total(),
            if turns == 1 { "" } else { "s" }
        )
        .dimmed()
    );
}

/// Print the banner shown at REPL start.
pub fn print_banner(provider: &str, model: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "MyCoder".cyan().bold(), version.dimmed());
    println!("{}", format!("{provider} · {model}").dimmed());
    println!(
        "{}",
        "Type a task, /clear to start over, /usage for token counts, or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Replace every secret value in a serialized config with a masked form.
pub fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                match v {
                    Value::String(s) if SECRET_KEYS.contains(&key.as_str()) => {
                        *s = mask_secret(s);
                    }
                    _ => mask_secrets(v),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

/// Show paths under the home directory as `~/...`.
pub fn display_path(path: &Path) -> String {
    match dirs_next::home_dir().and_then(|home| path.strip_prefix(home).ok().map(Path::to_path_buf)) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => path.display().to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
