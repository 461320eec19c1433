//! Engine configuration.
//!
//! ```toml
//! terminationStrategy = "terminateOnInProgressTasksCompletion"
//! maxPreparePasses = 16
//! ```

use crate::{Error, Result, TerminationStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound on preparation passes.
pub const DEFAULT_MAX_PREPARE_PASSES: usize = 64;

/// Defaults applied to every [`InvocationContext`](crate::InvocationContext)
/// built from this configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// How the engine reacts once a task faults.
    pub termination_strategy: TerminationStrategy,
    /// Upper bound on `before_group_invoke` fixpoint passes.
    pub max_prepare_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            termination_strategy: TerminationStrategy::default(),
            max_prepare_passes: DEFAULT_MAX_PREPARE_PASSES,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::Config`] if its contents are invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "reading engine configuration"))?;
        Self::from_toml_str(&text)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.max_prepare_passes == 0 {
            return Err(Error::config("maxPreparePasses must be at least 1"));
        }
        Ok(())
    }
}
