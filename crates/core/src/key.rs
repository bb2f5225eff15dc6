//! Query keys identifying cached result sets

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Ordered list of segments naming a logical query result set
///
/// `["unidades"]` names the unit list, `["unidades", "42"]` a single unit.
/// Invalidation matches by prefix, so invalidating `["unidades"]` covers both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryKey(SmallVec<[String; 2]>);

impl QueryKey {
    /// Build a key from segments. Empty keys and empty segments are rejected.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: SmallVec<[String; 2]> = segments.into_iter().map(Into::into).collect();

        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains('/')) {
            return Err(CoreError::InvalidKey(segments.join("/")));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` is `other` or one of its ancestors
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for QueryKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(CoreError::InvalidKey(String::new()));
        }
        Self::new(s.split('/'))
    }
}

impl TryFrom<String> for QueryKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<QueryKey> for String {
    fn from(value: QueryKey) -> Self {
        value.to_string()
    }
}
