use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TabsyncError, TabsyncResult};
use crate::types::TreePath;

/// Default storage key shared by every tab of an application
pub const DEFAULT_KEY: &str = "vuex-multi-tab";

/// Top-level configuration (loaded from tabsync.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabsyncConfig {
    pub sync: SyncOptions,
    pub logging: LoggingConfig,
}

impl TabsyncConfig {
    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> TabsyncResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| TabsyncError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> TabsyncResult<Self> {
        toml::from_str(content).map_err(|e| TabsyncError::Config(e.to_string()))
    }
}

/// Which parts of the state tree are synchronized, and under which key.
///
/// Paths are validated when the options are deserialized, so a loaded
/// `SyncOptions` only ever holds well-formed paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Storage key (channel namespace)
    pub key: String,
    /// Paths to synchronize; empty means the whole tree
    #[serde(alias = "statesPaths")]
    pub states_paths: Vec<TreePath>,
    /// Paths left out of published state; ignored when `states_paths` is set
    #[serde(alias = "statesRemove")]
    pub states_remove: Vec<TreePath>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.into(),
            states_paths: Vec::new(),
            states_remove: Vec::new(),
        }
    }
}

impl SyncOptions {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_states_paths<I, S>(mut self, paths: I) -> TabsyncResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.states_paths = TreePath::parse_all(paths)?;
        Ok(self)
    }

    pub fn with_states_remove<I, S>(mut self, paths: I) -> TabsyncResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.states_remove = TreePath::parse_all(paths)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}
