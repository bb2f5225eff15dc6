//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use franq_core::config::{config_file_path, CONFIG_ENV};
use franq_core::RealtimeConfig;
use std::path::{Path, PathBuf};

/// Config location: `--config`, then `$FRANQ_SYNC_CONFIG`, then the user config dir
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    config_file_path().with_context(|| {
        format!("Could not determine config file path (set {} or pass --config)", CONFIG_ENV)
    })
}

/// Load and validate the config at `path` (defaults when missing)
pub fn load_config(path: &Path) -> Result<RealtimeConfig> {
    RealtimeConfig::load_from(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
