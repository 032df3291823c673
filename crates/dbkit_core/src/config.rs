//! Database configuration loading.
//!
//! A config file is a small TOML document:
//!
//! ```toml
//! path = "app.db"            # or ":memory:"
//! soft_delete_default = true
//! busy_timeout_ms = 5000
//! ```

use crate::db::{DbError, DbResult, IN_MEMORY_PATH};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database file path; `:memory:` selects an in-memory database.
    pub path: PathBuf,
    /// Soft-delete setting for repositories instantiated through the registry.
    #[serde(default)]
    pub soft_delete_default: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            soft_delete_default: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_PATH)
    }

    pub fn with_soft_delete_default(mut self, enabled: bool) -> Self {
        self.soft_delete_default = enabled;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Parses and validates a TOML config document.
    ///
    /// # Errors
    /// - `DbError::Config` on malformed TOML, unknown keys or an empty path.
    pub fn from_toml_str(source: &str) -> DbResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| DbError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| {
            DbError::Config(format!("failed to read `{}`: {err}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(DbError::Config("path cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
