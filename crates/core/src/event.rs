//! Realtime change events as delivered by the backend change feed

use crate::{CoreError, Result, TableName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Schema used when an event or topic does not name one
pub const DEFAULT_SCHEMA: &str = "public";

/// Row-level operation that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl EventType {
    fn bit(self) -> u8 {
        match self {
            EventType::Insert => 0b001,
            EventType::Update => 0b010,
            EventType::Delete => 0b100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Insert => "INSERT",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(EventType::Insert),
            "UPDATE" => Ok(EventType::Update),
            "DELETE" => Ok(EventType::Delete),
            other => Err(CoreError::InvalidConfig(format!("unknown event type '{}'", other))),
        }
    }
}

/// A single row change
///
/// Wire shape: `{ "eventType": "UPDATE", "schema": "public", "table": "unidades",
/// "commit_timestamp": "...", "new": {...}, "old": {...} }`. Only `eventType`
/// and `table` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_type: EventType,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: TableName,
    #[serde(default, rename = "commit_timestamp", skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub new: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub old: Value,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl ChangeEvent {
    /// Payload-less event in the default schema
    pub fn new(event_type: EventType, table: TableName) -> Self {
        Self {
            event_type,
            schema: default_schema(),
            table,
            commit_timestamp: None,
            new: Value::Null,
            old: Value::Null,
        }
    }

    /// Parse one JSON object (one NDJSON line)
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Set of event types a channel listens to
///
/// Written as `*` for all events or a comma-separated list such as
/// `INSERT,DELETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventFilter(u8);

impl EventFilter {
    pub const ALL: EventFilter = EventFilter(0b111);

    pub fn only(types: &[EventType]) -> Self {
        Self(types.iter().fold(0, |mask, t| mask | t.bit()))
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        self.0 & event_type.bit() != 0
    }

    pub fn is_all(&self) -> bool {
        self.0 == Self::ALL.0
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("*");
        }
        let names: Vec<&str> = [EventType::Insert, EventType::Update, EventType::Delete]
            .into_iter()
            .filter(|t| self.matches(*t))
            .map(EventType::as_str)
            .collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for EventFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim() == "*" {
            return Ok(Self::ALL);
        }
        let types = s
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<EventType>>>()?;
        if types.is_empty() {
            return Err(CoreError::InvalidConfig("empty event filter".to_string()));
        }
        Ok(Self::only(&types))
    }
}

impl TryFrom<String> for EventFilter {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EventFilter> for String {
    fn from(value: EventFilter) -> Self {
        value.to_string()
    }
}
