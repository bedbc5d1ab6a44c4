//! Rotation policy for a single log target and the naming of its rotation
//! chain.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default rotation threshold used when a config entry omits `max_bytes`.
pub const DEFAULT_MAX_BYTES: i64 = 10 * 1024 * 1024;

/// Default retention used when a config entry omits `max_rotations`.
pub const DEFAULT_MAX_ROTATIONS: i64 = 5;

/// Size threshold and retention for one target path.
///
/// A non-positive `max_bytes` or `max_rotations` disables rotation; the
/// writer then behaves as a plain append-only file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Active log file. Historical files live next to it as `<path>.<n>`.
    pub path: PathBuf,

    /// Byte size of the active file beyond which it is rotated.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i64,

    /// Number of historical files kept.
    #[serde(default = "default_max_rotations")]
    pub max_rotations: i64,
}

const fn default_max_bytes() -> i64 {
    DEFAULT_MAX_BYTES
}

const fn default_max_rotations() -> i64 {
    DEFAULT_MAX_ROTATIONS
}

impl RotationPolicy {
    /// Creates a new `RotationPolicy`.
    pub fn new(path: impl Into<PathBuf>, max_bytes: i64, max_rotations: i64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            max_rotations,
        }
    }

    /// Policy that never rotates.
    pub fn unbounded(path: impl Into<PathBuf>) -> Self {
        Self::new(path, 0, 0)
    }

    /// Whether the writer should ever rotate this target.
    #[must_use]
    pub const fn rotation_enabled(&self) -> bool {
        self.max_bytes > 0 && self.max_rotations > 0
    }

    /// Checks that the path can name a log file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty path, a path without a
    /// final file name component, a file name that is not UTF-8, or a path
    /// that is an existing directory.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Configuration("log path is empty".to_string()));
        }

        let Some(base) = self.base_name() else {
            return Err(Error::Configuration(format!(
                "log path {} has no file name",
                self.path.display()
            )));
        };

        // Chain members are recognised by their UTF-8 name.
        if base.to_str().is_none() {
            return Err(Error::Configuration(format!(
                "log file name {} is not valid UTF-8",
                self.path.display()
            )));
        }

        if self.path.is_dir() {
            return Err(Error::Configuration(format!(
                "log path {} is a directory",
                self.path.display()
            )));
        }

        Ok(())
    }

    /// File name of the active file.
    pub(crate) fn base_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Directory holding the active file and its rotation chain.
    pub(crate) fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Path of the historical file at `index` (`<path>.<index>`).
    #[must_use]
    pub fn rotated_path(&self, index: u64) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    /// Parses the rotation index out of a sibling file name, if it belongs
    /// to this target's chain.
    pub(crate) fn rotation_index(&self, file_name: &OsStr) -> Option<u64> {
        let base = self.base_name()?.to_str()?;
        let suffix = file_name.to_str()?.strip_prefix(base)?.strip_prefix('.')?;

        // Only names `rotated_path` would produce: no sign, no leading zero.
        if !suffix.starts_with(|c: char| matches!(c, '1'..='9'))
            || !suffix.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        suffix.parse().ok()
    }
}
