//! Path-keyed registry of rotating writers.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use path_clean::PathClean;
use tracing::warn;

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::policy::RotationPolicy;
use crate::state::WriterStatus;
use crate::writer::RotatingWriter;

/// Hands out one [`RotatingWriter`] per target path.
///
/// Paths are resolved against the working directory and lexically cleaned,
/// so `logs/./task.log` and `logs/task.log` share a writer. Concurrent first
/// use of a path constructs exactly one writer; every other caller gets the
/// same instance.
#[derive(Debug, Default)]
pub struct WriterRegistry {
    writers: DashMap<PathBuf, Arc<RotatingWriter>>,
}

impl WriterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the writer for `policy.path`, opening it on first use.
    ///
    /// A registered writer that has been closed is replaced by a fresh one.
    /// A failed writer is returned as is; evict it with
    /// [`WriterRegistry::remove`] to recover.
    ///
    /// The map shard holding the path stays locked while a new writer is
    /// opened, so other paths in the same shard wait on that file's
    /// directory creation, open and stat. Checking a registered writer's
    /// status also takes that writer's state lock under the shard lock.
    ///
    /// # Errors
    ///
    /// Returns the error from [`RotatingWriter::open`]. Nothing is
    /// registered in that case.
    pub fn open(&self, policy: RotationPolicy) -> Result<Arc<RotatingWriter>> {
        policy.validate()?;

        let key = normalize(&policy.path)?;
        let requested = RotationPolicy {
            path: key.clone(),
            ..policy
        };

        let (writer, mismatch) = match self.writers.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().status() == WriterStatus::Closed {
                    let writer = Arc::new(RotatingWriter::open(requested)?);
                    entry.insert(Arc::clone(&writer));
                    (writer, false)
                } else {
                    let writer = Arc::clone(entry.get());
                    let mismatch = *writer.policy() != requested;
                    (writer, mismatch)
                }
            }
            Entry::Vacant(entry) => {
                let writer = Arc::new(RotatingWriter::open(requested)?);
                entry.insert(Arc::clone(&writer));
                (writer, false)
            }
        };

        if mismatch {
            warn!(
                path = %writer.path().display(),
                max_bytes = writer.policy().max_bytes,
                max_rotations = writer.policy().max_rotations,
                "log target already open with a different policy, keeping it"
            );
        }

        Ok(writer)
    }

    /// Opens every target in `config`.
    ///
    /// # Errors
    ///
    /// Stops at the first target that fails to open. Targets opened before
    /// it stay registered.
    pub fn open_all(&self, config: &LogConfig) -> Result<Vec<Arc<RotatingWriter>>> {
        config
            .targets
            .iter()
            .map(|policy| self.open(policy.clone()))
            .collect()
    }

    /// The registered writer for `path`, if any.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<RotatingWriter>> {
        let key = normalize(path.as_ref()).ok()?;
        self.writers.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Evicts the writer for `path` without closing it.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Arc<RotatingWriter>> {
        let key = normalize(path.as_ref()).ok()?;
        self.writers.remove(&key).map(|(_, writer)| writer)
    }

    /// Evicts and closes the writer for `path`. Unknown paths are a no-op.
    ///
    /// # Errors
    ///
    /// Returns the error from [`RotatingWriter::close`].
    pub fn close(&self, path: impl AsRef<Path>) -> Result<()> {
        match self.remove(path) {
            Some(writer) => writer.close(),
            None => Ok(()),
        }
    }

    /// Evicts and closes every writer, returning the failures.
    ///
    /// Writers that were already closed are not reported.
    pub fn close_all(&self) -> Vec<(PathBuf, Error)> {
        let keys: Vec<PathBuf> = self.writers.iter().map(|e| e.key().clone()).collect();

        let mut failures = Vec::new();
        for key in keys {
            let Some((path, writer)) = self.writers.remove(&key) else {
                continue;
            };

            match writer.close() {
                Ok(()) | Err(Error::Closed) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error closing log writer");
                    failures.push((path, e));
                }
            }
        }

        failures
    }

    /// Number of registered writers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Whether no writer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|e| Error::io("error resolving working directory for", path, e))?
            .join(path)
    };

    Ok(absolute.clean())
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use tracing_test::traced_test;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/var/log/./app/../task.log")).unwrap(),
            PathBuf::from("/var/log/task.log")
        );

        let relative = normalize(Path::new("logs/task.log")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("logs/task.log"));
    }

    #[test]
    fn test_open_returns_same_writer() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();

        let a = registry
            .open(RotationPolicy::new(dir.path().join("task.log"), 100, 2))
            .unwrap();
        let b = registry
            .open(RotationPolicy::new(
                dir.path().join("sub/../task.log"),
                100,
                2,
            ))
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[traced_test]
    fn test_open_with_different_policy_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();
        let path = dir.path().join("task.log");

        let first = registry.open(RotationPolicy::new(&path, 100, 2)).unwrap();
        let second = registry.open(RotationPolicy::new(&path, 500, 9)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.policy().max_bytes, 100);
        assert!(logs_contain("already open with a different policy"));
    }

    #[test]
    fn test_failed_open_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();

        let result = registry.open(RotationPolicy::new(dir.path(), 100, 2));

        assert_matches!(result, Err(Error::Configuration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closed_writer_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 100, 2);

        let first = registry.open(policy.clone()).unwrap();
        first.close().unwrap();

        let second = registry.open(policy).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.status(), WriterStatus::Writing);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_remove_close() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();
        let path = dir.path().join("task.log");

        assert!(registry.get(&path).is_none());

        let writer = registry.open(RotationPolicy::new(&path, 100, 2)).unwrap();
        assert!(Arc::ptr_eq(&registry.get(&path).unwrap(), &writer));

        let removed = registry.remove(&path).unwrap();
        assert!(Arc::ptr_eq(&removed, &writer));
        assert!(registry.get(&path).is_none());
        assert_eq!(writer.status(), WriterStatus::Writing);

        let writer = registry.open(RotationPolicy::new(&path, 100, 2)).unwrap();
        registry.close(&path).unwrap();
        assert_eq!(writer.status(), WriterStatus::Closed);
        assert!(registry.is_empty());

        registry.close(&path).unwrap();
    }

    #[test]
    fn test_close_all() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WriterRegistry::new();

        let config = LogConfig {
            targets: vec![
                RotationPolicy::new(dir.path().join("a.log"), 100, 2),
                RotationPolicy::new(dir.path().join("b.log"), 100, 2),
            ],
        };
        let writers = registry.open_all(&config).unwrap();
        writers[1].close().unwrap();

        let failures = registry.close_all();

        assert!(failures.is_empty());
        assert!(registry.is_empty());
        assert!(
            writers
                .iter()
                .all(|writer| writer.status() == WriterStatus::Closed)
        );
    }
}
