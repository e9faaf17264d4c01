//! `mycoder config`: show the resolved configuration.
//!
//! Prints the config file location, the effective provider and model, key
//! status per provider, and the full configuration as JSON with every secret
//! masked.

use anyhow::Result;
use colored::Colorize;

use mycoder_core::config::{get_config_path, Config};
use mycoder_providers::registry::{context_window_for, find_by_kind, PROVIDERS};

use crate::helpers::{display_path, mask_secrets};

/// Run the config command.
pub fn run(config: &Config) -> Result<()> {
    let config_path = get_config_path();
    let spec = find_by_kind(config.agent.provider);
    let model = effective_model(config);

    println!();
    println!("{}", "MyCoder Configuration".cyan().bold());
    println!();
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        display_path(&config_path),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".yellow().to_string()
        }
    );
    println!("  {:<18} {}", "Provider:".bold(), spec.display_name);
    println!("  {:<18} {}", "Model:".bold(), model);
    println!(
        "  {:<18} {}",
        "Context window:".bold(),
        config
            .agent
            .context_window
            .unwrap_or_else(|| context_window_for(&model, spec))
    );
    println!(
        "  {:<18} {:?} | max turns: {}",
        "Sub-agents:".bold(),
        config.agent.sub_agent_mode,
        config.agent.max_turns
    );

    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let status = if config.providers.get(spec.kind).is_configured() {
            format!("{} (key set)", "✓".green())
        } else if spec.requires_key {
            format!("{} (set {})", "· not configured".dimmed(), spec.env_key)
        } else {
            format!("{}", "· no key needed".dimmed())
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    println!();
    println!("{}", render_masked(config)?);
    println!();
    Ok(())
}

/// The model actually used: configured or the provider's default.
fn effective_model(config: &Config) -> String {
    if config.agent.model.trim().is_empty() {
        find_by_kind(config.agent.provider).default_model.to_string()
    } else {
        config.agent.model.clone()
    }
}

/// Pretty JSON of `config` with secrets masked.
fn render_masked(config: &Config) -> Result<String> {
    let mut value = serde_json::to_value(config)?;
    mask_secrets(&mut value);
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycoder_core::schema::ProviderKind;

    #[test]
    fn rendered_config_hides_keys() {
        let mut config = Config::default();
        config.providers.openai.api_key = "sk-proj-secretvalue".into();
        let out = render_masked(&config).unwrap();
        assert!(out.contains("sk-p****"));
        assert!(!out.contains("secretvalue"));
    }

    #[test]
    fn effective_model_falls_back_to_default() {
        let mut config = Config::default();
        config.agent.provider = ProviderKind::OpenAi;
        assert_eq!(effective_model(&config), "gpt-4o");
        config.agent.model = "gpt-4o-mini".into();
        assert_eq!(effective_model(&config), "gpt-4o-mini");
    }
}
