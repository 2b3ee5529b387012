//! Configuration command handlers

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::{AppConfig, ConfigManager};

/// Handle `ogresync config show`
pub fn handle_config_show() -> Result<()> {
    let path = ConfigManager::config_file_path()?;
    let config = AppConfig::load()?;

    println!("{}", "Current Configuration".cyan().bold());
    println!("{}", "=".repeat(60).cyan());
    println!("  {} {}", "File:".dimmed(), path.display());
    println!(
        "  {} {}",
        "Log file:".dimmed(),
        ConfigManager::log_file_path()?.display()
    );
    println!();

    let text = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", text);
    Ok(())
}
