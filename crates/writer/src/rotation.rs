//! Background rotation of a writer's active file.
//!
//! One worker runs per rotation event. Everything up to reopening the active
//! file happens outside the writer's lock; the lock is only taken to drain
//! the buffer and flip the writer back to `Writing`.

use std::fs::{self, File};
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::file;
use crate::policy::RotationPolicy;
use crate::writer::Shared;

pub(crate) struct RotationWorker {
    shared: Arc<Shared>,
    retiring: File,
}

impl RotationWorker {
    /// Starts a worker thread that retires `retiring`.
    pub(crate) fn spawn(shared: Arc<Shared>, retiring: File) -> io::Result<()> {
        let worker = Self { shared, retiring };

        thread::Builder::new()
            .name("logroll-rotation".to_string())
            .spawn(move || worker.run())
            .map(|_| ())
    }

    fn run(self) {
        let Self { shared, retiring } = self;
        let policy = &shared.policy;

        debug!(path = %policy.path.display(), "rotating log file");

        let outcome = retire(policy, retiring)
            .and_then(|()| file::open_append(&policy.path, policy.parent_dir()));

        let mut state = shared.state.lock();
        let result = outcome.and_then(|fresh| state.finish_rotation(fresh, policy));
        let failure = match result {
            Ok(drained) => {
                shared.rotations.fetch_add(1, Ordering::AcqRel);
                drop(state);
                shared.rotation_done.notify_all();

                debug!(path = %policy.path.display(), drained, "rotation complete");
                return;
            }
            Err(e) => state.fail(e),
        };
        drop(state);
        shared.rotation_done.notify_all();

        error!(path = %policy.path.display(), error = %failure, "rotation failed");
    }
}

/// Closes the active file and moves it to the head of the rotation chain,
/// shifting and pruning historical files.
fn retire(policy: &RotationPolicy, mut active: File) -> Result<()> {
    active
        .flush()
        .and_then(|()| active.sync_all())
        .map_err(|e| Error::io("error syncing", &policy.path, e))?;
    drop(active);

    let max_rotations = policy.max_rotations.unsigned_abs();
    let mut history = list_history(policy)?;
    history.sort_unstable();

    // Anything that would land beyond the retention bound after the shift.
    let (kept, pruned): (Vec<u64>, Vec<u64>) =
        history.into_iter().partition(|index| *index < max_rotations);

    for index in pruned {
        let path = policy.rotated_path(index);
        fs::remove_file(&path).map_err(|e| Error::io("error removing", path, e))?;
    }

    // Highest first so no rename lands on a file still waiting to move.
    for index in kept.into_iter().rev() {
        let from = policy.rotated_path(index);
        let to = policy.rotated_path(index + 1);
        fs::rename(&from, &to).map_err(|e| Error::io("error renaming", from, e))?;
    }

    let head = policy.rotated_path(1);
    fs::rename(&policy.path, &head).map_err(|e| Error::io("error renaming", &policy.path, e))?;

    Ok(())
}

/// Indices of the historical files currently next to the active file.
fn list_history(policy: &RotationPolicy) -> Result<Vec<u64>> {
    let dir = policy.parent_dir();
    let entries = fs::read_dir(dir).map_err(|e| Error::io("error listing", dir, e))?;

    let mut indices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("error listing", dir, e))?;
        if let Some(index) = policy.rotation_index(&entry.file_name()) {
            indices.push(index);
        }
    }

    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    fn touch(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_list_history_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 5);

        touch(&policy.path, "");
        touch(&policy.rotated_path(1), "");
        touch(&policy.rotated_path(3), "");
        touch(&dir.path().join("task.log.bak"), "");
        touch(&dir.path().join("other.log.2"), "");

        let mut history = list_history(&policy).unwrap();
        history.sort_unstable();

        assert_eq!(history, vec![1, 3]);
    }

    #[test]
    fn test_retire_shifts_chain() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 3);

        touch(&policy.path, "active");
        touch(&policy.rotated_path(1), "one");
        touch(&policy.rotated_path(2), "two");

        retire(&policy, File::open(&policy.path).unwrap()).unwrap();

        assert!(!policy.path.exists());
        assert_eq!(read(&policy.rotated_path(1)), "active");
        assert_eq!(read(&policy.rotated_path(2)), "one");
        assert_eq!(read(&policy.rotated_path(3)), "two");
    }

    #[test]
    fn test_retire_prunes_beyond_retention() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 2);

        touch(&policy.path, "active");
        touch(&policy.rotated_path(1), "one");
        touch(&policy.rotated_path(2), "two");
        touch(&policy.rotated_path(7), "stale");

        retire(&policy, File::open(&policy.path).unwrap()).unwrap();

        assert_eq!(read(&policy.rotated_path(1)), "active");
        assert_eq!(read(&policy.rotated_path(2)), "one");
        assert!(!policy.rotated_path(3).exists());
        assert!(!policy.rotated_path(7).exists());
    }

    #[test]
    fn test_retire_keeps_gaps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 5);

        touch(&policy.path, "active");
        touch(&policy.rotated_path(2), "two");

        retire(&policy, File::open(&policy.path).unwrap()).unwrap();

        assert_eq!(read(&policy.rotated_path(1)), "active");
        assert!(!policy.rotated_path(2).exists());
        assert_eq!(read(&policy.rotated_path(3)), "two");
    }

    #[test]
    fn test_retire_leaves_non_canonical_names_alone() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 3);

        touch(&policy.path, "active");
        touch(&policy.rotated_path(1), "one");
        touch(&dir.path().join("task.log.01"), "zero-padded");
        touch(&dir.path().join("task.log.0005"), "padded stale");

        retire(&policy, File::open(&policy.path).unwrap()).unwrap();

        assert_eq!(read(&policy.rotated_path(1)), "active");
        assert_eq!(read(&policy.rotated_path(2)), "one");
        assert_eq!(read(&dir.path().join("task.log.01")), "zero-padded");
        assert_eq!(read(&dir.path().join("task.log.0005")), "padded stale");
    }

    #[test]
    fn test_retire_missing_active_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let policy = RotationPolicy::new(dir.path().join("task.log"), 10, 2);

        touch(&policy.path, "active");
        let handle = File::open(&policy.path).unwrap();
        fs::remove_file(&policy.path).unwrap();

        let result = retire(&policy, handle);
        assert!(matches!(
            result,
            Err(Error::Io { context: "error renaming", .. })
        ));
    }
}
