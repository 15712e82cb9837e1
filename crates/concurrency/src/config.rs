//! Transaction manager configuration via `enlist.toml`
//!
//! All settings have defaults, so an empty file (or no file at all) yields
//! a working manager. Values are checked eagerly on load.

use enlist_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name conventionally used for a manager config.
pub const CONFIG_FILE_NAME: &str = "enlist.toml";

/// Upper bound on `initial_depth`.
pub const MAX_INITIAL_DEPTH: usize = 1024;

/// Configuration for a [`TransactionManager`](crate::TransactionManager).
///
/// # Example
///
/// ```toml
/// # Levels preallocated at construction
/// initial_depth = 4
/// # Admit non-owner threads to the outer lock in arrival order
/// fair_outer_lock = true
/// # Yield the processor after a non-owner thread's root close
/// yield_on_root_close = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Number of level slots allocated up front
    #[serde(default = "default_initial_depth")]
    pub initial_depth: usize,
    /// Whether non-owner threads queue for the outer lock in FIFO order
    #[serde(default = "default_true")]
    pub fair_outer_lock: bool,
    /// Whether a non-owner root close yields the processor once
    #[serde(default = "default_true")]
    pub yield_on_root_close: bool,
}

fn default_initial_depth() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            initial_depth: default_initial_depth(),
            fair_outer_lock: true,
            yield_on_root_close: true,
        }
    }
}

impl ManagerConfig {
    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `initial_depth` exceeds
    /// [`MAX_INITIAL_DEPTH`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_depth > MAX_INITIAL_DEPTH {
            return Err(ConfigError::InvalidValue {
                field: "initial_depth",
                reason: format!(
                    "{} exceeds the maximum of {}",
                    self.initial_depth, MAX_INITIAL_DEPTH
                ),
            });
        }
        Ok(())
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse(msg) => {
                ConfigError::Parse(format!("'{}': {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# enlist transaction manager configuration
#
# Level slots allocated when the manager is created (default: 4).
# Deeper nesting still works; extra slots are allocated on demand.
initial_depth = 4

# Admit non-owner threads to the outer lock in arrival order (default: true).
fair_outer_lock = true

# Yield the processor once after a non-owner thread closes its outermost
# transaction, giving the owner thread a chance to get in (default: true).
yield_on_root_close = true
"#
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
