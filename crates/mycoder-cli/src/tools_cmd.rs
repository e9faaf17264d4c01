//! `mycoder tools`: list the tools the agent would be given.

use anyhow::Result;
use colored::Colorize;

use mycoder_core::config::Config;
use mycoder_core::schema::ToolSpec;

/// Run the tools command.
pub async fn run(config: &Config) -> Result<()> {
    let (_provider, toolset) = crate::build_session(config).await?;
    let specs = toolset.tools.specs();

    println!();
    println!("{}", format!("{} tools", specs.len()).cyan().bold());
    println!();
    for spec in &specs {
        println!("{}", format_spec(spec));
    }
    println!();
    Ok(())
}

/// `  name(arg, arg?)  description`
fn format_spec(spec: &ToolSpec) -> String {
    let required: Vec<&str> = spec
        .parameters
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let mut args: Vec<String> = spec
        .parameters
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|props| {
            props
                .keys()
                .map(|k| if required.contains(&k.as_str()) { k.clone() } else { format!("{k}?") })
                .collect()
        })
        .unwrap_or_default();
    args.sort_by_key(|a| a.ends_with('?'));

    format!(
        "  {}({})\n      {}",
        spec.name.bold(),
        args.join(", "),
        spec.description.dimmed()
    )
}
