//! Filesystem helpers shared by the writer and the rotation worker.

use std::fs::{DirBuilder, File, OpenOptions};
use std::path::Path;

use crate::error::{Error, Result};

/// Mode for newly created log files, before umask.
#[cfg(unix)]
const FILE_MODE: u32 = 0o666;

/// Mode for newly created log directories, before umask.
#[cfg(unix)]
const DIR_MODE: u32 = 0o777;

/// Creates `dir` and any missing ancestors.
pub(crate) fn create_dir_all(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    builder
        .create(dir)
        .map_err(|e| Error::io("error creating directory", dir, e))
}

/// Opens `path` for appending, creating it (and its parent directories) if
/// missing.
pub(crate) fn open_append(path: &Path, parent: &Path) -> Result<File> {
    create_dir_all(parent)?;

    let mut options = OpenOptions::new();
    options.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    options
        .open(path)
        .map_err(|e| Error::io("error opening", path, e))
}
