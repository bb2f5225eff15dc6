//! Configuration management command
//!
//! Provides CLI interface to view and edit the realtime configuration.

use crate::util;
use anyhow::{Context, Result};
use franq_core::config::example_config;
use franq_core::RealtimeConfig;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

/// List all configuration values
pub async fn run_list(config_path: &Path) -> Result<()> {
    let config = util::load_config(config_path)?;

    println!("{}", "franq-sync Configuration".bold());
    println!("{}: {}\n", "Location".dimmed(), config_path.display().dimmed());

    println!("{}", "[realtime]".yellow());
    println!(
        "  {} = {} {}",
        "debounce_ms".cyan(),
        config.realtime.debounce_ms,
        format!("({:?})", config.realtime.debounce()).dimmed()
    );
    println!("  {} = {}", "schema".cyan(), config.realtime.schema);
    println!(
        "  {} = {} {}",
        "fallback_poll_secs".cyan(),
        config.realtime.fallback_poll_secs,
        if config.realtime.fallback_poll_secs == 0 {
            "(disabled)".dimmed().to_string()
        } else {
            format!("({}s)", config.realtime.fallback_poll_secs).dimmed().to_string()
        }
    );

    println!("\n{}", "[log]".yellow());
    println!(
        "  {} = {}",
        "dir".cyan(),
        match &config.log.dir {
            Some(dir) => dir.display().to_string(),
            None => "(stderr only)".dimmed().to_string(),
        }
    );

    println!("\n{} {}", "[[bindings]]".yellow(), format!("({})", config.bindings.len()).dimmed());
    for binding in &config.bindings {
        println!("  {} -> {} [{}]", binding.table.cyan(), binding.key, binding.events);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  debounce_ms: 1-60000");
    println!("  fallback_poll_secs: 0 (disabled) or 5-86400");

    Ok(())
}

/// Get a single configuration value
pub async fn run_get(config_path: &Path, key: &str) -> Result<()> {
    let config = util::load_config(config_path)?;

    let value = match key {
        "realtime.debounce_ms" => config.realtime.debounce_ms.to_string(),
        "realtime.schema" => config.realtime.schema,
        "realtime.fallback_poll_secs" => config.realtime.fallback_poll_secs.to_string(),
        "log.dir" => config
            .log
            .dir
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'franq-sync config --list' to see available keys.",
            key
        ),
    };

    println!("{}", value);
    Ok(())
}

/// Set a configuration value
pub async fn run_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = util::load_config(config_path)?;
    apply(&mut config, key, value)?;

    // save_to validates before writing
    config
        .save_to(config_path)
        .context("Invalid configuration value")?;

    println!("{} {} = {}", "✓".green(), key.cyan(), value);
    println!(
        "{}",
        "Note: restart running watchers for changes to take effect".yellow()
    );

    Ok(())
}

fn apply(config: &mut RealtimeConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "realtime.debounce_ms" => {
            config.realtime.debounce_ms = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        "realtime.schema" => {
            config.realtime.schema = value.to_string();
        }
        "realtime.fallback_poll_secs" => {
            config.realtime.fallback_poll_secs = value
                .parse()
                .context("Invalid value: must be a non-negative integer")?;
        }
        "log.dir" => {
            config.log.dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'franq-sync config --list' to see available keys.",
            key
        ),
    }
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(config_path: &Path, create: bool) -> Result<()> {
    if create && !config_path.exists() {
        RealtimeConfig::default().save_to(config_path)?;
        println!("{} Created config file at: {}", "✓".green(), config_path.display());
    } else if config_path.exists() {
        println!("{}", config_path.display());
    } else {
        println!("{}", config_path.display());
        println!("{}", "File does not exist. Use --create to create it.".yellow());
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", example_config());
    Ok(())
}
