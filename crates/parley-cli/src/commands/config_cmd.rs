//! `parley config` -- display the effective configuration.
//!
//! Prints the loaded (or default) configuration as formatted JSON, every
//! default filled in. `--section` narrows the output to one top-level key;
//! `--channel` shows the settings a channel id resolves to.
//!
//! # Examples
//!
//! ```text
//! parley config
//! parley config --section media
//! parley config --channel telegram
//! ```

use clap::Args;

use parley_types::config::Config;

/// Arguments for the `parley config` subcommand.
#[derive(Args)]
pub struct ConfigArgs {
    /// Only show this top-level section (channels, defaults, media, pipeline).
    #[arg(long, conflicts_with = "channel")]
    pub section: Option<String>,

    /// Show the settings that apply to this channel id.
    #[arg(long)]
    pub channel: Option<String>,
}

pub fn run(args: &ConfigArgs, config: &Config) -> anyhow::Result<()> {
    println!("{}", render(args, config)?);
    Ok(())
}

fn render(args: &ConfigArgs, config: &Config) -> anyhow::Result<String> {
    if let Some(id) = &args.channel {
        return Ok(serde_json::to_string_pretty(config.channel(id))?);
    }

    let value = serde_json::to_value(config)?;
    let Some(section) = &args.section else {
        return Ok(serde_json::to_string_pretty(&value)?);
    };
    match value.get(section) {
        Some(v) => Ok(serde_json::to_string_pretty(v)?),
        None => {
            let available: Vec<&str> = value
                .as_object()
                .map(|m| m.keys().map(String::as_str).collect())
                .unwrap_or_default();
            anyhow::bail!(
                "unknown section '{section}' (available: {})",
                available.join(", ")
            )
        }
    }
}
