//! Show configured table bindings

use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = util::load_config(config_path)?;

    if config.bindings.is_empty() {
        println!("{}", "No tables bound.".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "Bindings".bold(),
        format!("(schema {}, debounce {}ms)", config.realtime.schema, config.realtime.debounce_ms)
            .dimmed()
    );
    for binding in &config.bindings {
        println!("  {} -> {} [{}]", binding.table, binding.key, binding.events);
    }

    Ok(())
}
