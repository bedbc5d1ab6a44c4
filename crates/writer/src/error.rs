use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The writer was closed.
    #[error("writer is closed")]
    Closed,

    /// Invalid target path or configuration document.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem operation failed.
    #[error("{context} {}: {source}", .path.display())]
    Io {
        /// What was being attempted.
        context: &'static str,
        /// The file or directory the operation targeted.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The writer failed during rotation and will not recover.
    #[error("writer failed during rotation: {0}")]
    StickyFailure(#[source] Arc<Self>),
}

impl Error {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        let kind = match &error {
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::Configuration(_) => io::ErrorKind::InvalidInput,
            Error::Io { source, .. } => source.kind(),
            Error::StickyFailure(_) => io::ErrorKind::Other,
        };

        Self::new(kind, error)
    }
}
