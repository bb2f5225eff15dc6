//! Table identifiers of the back office database

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store units
pub const UNIDADES: &str = "unidades";
/// Franchisees
pub const FRANQUEADOS: &str = "franqueados";
/// Franchise-registration submissions awaiting approval
pub const ONBOARDING_REQUESTS: &str = "onboarding_requests";
/// Back-office users
pub const USUARIOS: &str = "usuarios";
/// Outgoing webhook subscriptions
pub const WEBHOOKS: &str = "webhooks";

/// Tables the back office watches by default
pub const WELL_KNOWN: [&str; 5] = [UNIDADES, FRANQUEADOS, ONBOARDING_REQUESTS, USUARIOS, WEBHOOKS];

/// A validated table identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');

        if !valid {
            return Err(CoreError::InvalidTable(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}
