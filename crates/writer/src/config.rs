//! TOML configuration for a set of log targets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::RotationPolicy;

/// Log targets a process writes to.
///
/// ```toml
/// [[targets]]
/// path = "/var/log/app/task.log"
/// max_bytes = 10485760
/// max_rotations = 5
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One entry per target path.
    #[serde(default)]
    pub targets: Vec<RotationPolicy>,
}

impl LogConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the document is malformed or a
    /// target path is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;

        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`LogConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| Error::io("error reading config", path, e))?;

        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        for target in &self.targets {
            target.validate()?;
        }

        Ok(())
    }
}
