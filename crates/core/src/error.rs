//! Error types for franq-core

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid table name '{0}': expected [A-Za-z0-9_]+")]
    InvalidTable(String),

    #[error("invalid query key '{0}': segments must be non-empty")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config at {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("malformed change event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    #[error("fetch failed for '{key}': {reason}")]
    Fetch { key: String, reason: String },
}
