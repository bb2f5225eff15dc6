//! Realtime sync configuration
//!
//! Loaded from TOML. Resolution order for the file location:
//! 1. `$FRANQ_SYNC_CONFIG`
//! 2. `<user config dir>/franq-sync/config.toml`
//!
//! A missing file yields the defaults.

use crate::event::DEFAULT_SCHEMA;
use crate::table::WELL_KNOWN;
use crate::{CoreError, EventFilter, QueryKey, Result, TableName};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "FRANQ_SYNC_CONFIG";

/// Quiet period before a burst of changes is turned into one invalidation
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

const DEBOUNCE_RANGE: std::ops::RangeInclusive<u64> = 1..=60_000;
const FALLBACK_POLL_RANGE: std::ops::RangeInclusive<u64> = 5..=86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub realtime: RealtimeSection,
    pub log: LogConfig,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSection {
    /// Debounce delay in milliseconds (1-60000)
    pub debounce_ms: u64,
    /// Database schema whose tables are watched
    pub schema: String,
    /// Periodic refresh of all bound keys, in seconds (0 = disabled, else 5-86400)
    pub fallback_poll_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for daily rolling log files; stderr only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// A table whose changes invalidate a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub table: TableName,
    pub key: QueryKey,
    #[serde(default)]
    pub events: EventFilter,
}

impl Binding {
    pub fn new(table: TableName, key: QueryKey) -> Self {
        Self { table, key, events: EventFilter::ALL }
    }

    /// Parse `table=key`, or just `table` to bind it to a key of the same name
    pub fn parse(spec: &str) -> Result<Self> {
        let (table, key) = match spec.split_once('=') {
            Some((table, key)) => (table.trim(), key.trim()),
            None => (spec.trim(), spec.trim()),
        };
        Ok(Self::new(table.parse()?, key.parse()?))
    }
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            schema: DEFAULT_SCHEMA.to_string(),
            fallback_poll_secs: 0,
        }
    }
}

impl RealtimeSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback_poll(&self) -> Option<Duration> {
        (self.fallback_poll_secs > 0).then(|| Duration::from_secs(self.fallback_poll_secs))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        let bindings = WELL_KNOWN
            .iter()
            .filter_map(|name| Binding::parse(name).ok())
            .collect();

        Self {
            realtime: RealtimeSection::default(),
            log: LogConfig::default(),
            bindings,
        }
    }
}

impl RealtimeConfig {
    /// Check value ranges and binding uniqueness
    pub fn validate(&self) -> Result<()> {
        let rt = &self.realtime;

        if !DEBOUNCE_RANGE.contains(&rt.debounce_ms) {
            return Err(CoreError::InvalidConfig(format!(
                "realtime.debounce_ms must be between {} and {}, got {}",
                DEBOUNCE_RANGE.start(),
                DEBOUNCE_RANGE.end(),
                rt.debounce_ms
            )));
        }

        if rt.fallback_poll_secs != 0 && !FALLBACK_POLL_RANGE.contains(&rt.fallback_poll_secs) {
            return Err(CoreError::InvalidConfig(format!(
                "realtime.fallback_poll_secs must be 0 or between {} and {}, got {}",
                FALLBACK_POLL_RANGE.start(),
                FALLBACK_POLL_RANGE.end(),
                rt.fallback_poll_secs
            )));
        }

        // Schema names follow the same rules as table names
        TableName::new(rt.schema.as_str())
            .map_err(|_| CoreError::InvalidConfig(format!("invalid schema '{}'", rt.schema)))?;

        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert((&binding.table, &binding.key)) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate binding {} -> {}",
                    binding.table, binding.key
                )));
            }
        }

        Ok(())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Validate and write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let write_err = |source| CoreError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(write_err)?;
        Ok(())
    }
}

/// Resolved config file location
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("franq-sync").join("config.toml"))
}

/// Annotated example configuration
pub fn example_config() -> &'static str {
    r#"# franq-sync configuration

[realtime]
# Quiet period (ms) before a burst of changes triggers one invalidation
debounce_ms = 500
# Database schema whose tables are watched
schema = "public"
# Refresh every bound key on this interval (s) even without changes; 0 disables
fallback_poll_secs = 0

[log]
# Directory for daily rolling log files (omit to log to stderr only)
# dir = "/var/log/franq-sync"

[[bindings]]
table = "unidades"
key = "unidades"

[[bindings]]
table = "franqueados"
key = "franqueados"

[[bindings]]
table = "onboarding_requests"
key = "onboarding_requests"
# Only react to new submissions and status changes
events = "INSERT,UPDATE"
"#
}
