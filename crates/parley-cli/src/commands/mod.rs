//! CLI command implementations for `parley`.
//!
//! - [`run`] -- Console pipeline with an echo engine.
//! - [`chunk`] -- Outbound chunker on stdin.
//! - [`config_cmd`] -- Effective configuration.

pub mod chunk;
pub mod config_cmd;
pub mod run;

use std::path::Path;

use parley_types::config::Config;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

/// Load and validate configuration.
///
/// An explicit `config_override` must exist. Otherwise `PARLEY_CONFIG` is
/// consulted; when it is unset or points at a missing file, defaults are
/// used.
pub async fn load_config(config_override: Option<&str>) -> anyhow::Result<Config> {
    let path = match config_override {
        Some(path) => {
            if !Path::new(path).exists() {
                anyhow::bail!("config file not found: {path}");
            }
            Some(path.to_owned())
        }
        None => std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| Path::new(p).exists()),
    };

    let config = match path {
        Some(path) => {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
            Config::from_json_str(&contents)
                .map_err(|e| anyhow::anyhow!("failed to parse config {path}: {e}"))?
        }
        None => Config::default(),
    };

    config.validate()?;
    Ok(config)
}
