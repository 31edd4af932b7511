use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TabsyncError;

/// A nested tree of mappings, arrays and scalar leaves.
///
/// Owned `serde_json::Value`s cannot form cycles, so every tree handled by
/// tabsync is acyclic.
pub type StateTree = serde_json::Value;

/// A dot-delimited address into a [`StateTree`], e.g. `user.profile.name`.
///
/// Segments are kept as strings: a segment is a mapping key when it meets a
/// mapping and an array index when it meets an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TreePath {
    raw: String,
    segments: Vec<String>,
}

impl TreePath {
    pub fn parse(raw: &str) -> Result<Self, TabsyncError> {
        if raw.is_empty() {
            return Err(TabsyncError::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty".into(),
            });
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if let Some(pos) = segments.iter().position(|s| s.is_empty()) {
            return Err(TabsyncError::InvalidPath {
                path: raw.to_string(),
                reason: format!("segment {pos} is empty"),
            });
        }

        Ok(TreePath {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parse a list of raw paths, failing on the first malformed one.
    pub fn parse_all<I, S>(raws: I) -> Result<Vec<Self>, TabsyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raws.into_iter().map(|r| Self::parse(r.as_ref())).collect()
    }
}

impl FromStr for TreePath {
    type Err = TabsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TreePath {
    type Error = TabsyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.raw
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A local mutation as reported by the host store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Mutation name, e.g. `cart/addItem`
    #[serde(rename = "type")]
    pub kind: String,
    /// Mutation payload (`null` when the mutation carries none)
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A mutation together with the full state after it was applied
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    pub mutation: Mutation,
    pub state: StateTree,
}
