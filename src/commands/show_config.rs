//! Print the effective configuration.

use anyhow::{Context, Result};
use benchbox::config::{Config, CONFIG_FILE};
use colored::Colorize;
use std::path::Path;

/// Renders the config as TOML, preceded by a comment naming its origin.
pub fn render(config: &Config, project_dir: &Path) -> Result<String> {
    let source = if project_dir.join(CONFIG_FILE).exists() {
        CONFIG_FILE
    } else {
        "defaults"
    };
    let body = toml::to_string_pretty(config).context("Failed to render config")?;
    Ok(format!("# source: {source}\n{body}"))
}

/// Entry point: loads the config from the current directory and prints it.
pub async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;
    print!("{}", render(&config, &cwd)?);
    eprintln!(
        "{} backend: {}",
        "ℹ".blue(),
        config.sandbox.backend.to_string().cyan()
    );
    Ok(())
}
